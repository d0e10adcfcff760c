use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_percent(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.2}%")
    } else {
        "0.00%".to_string()
    }
}

/// Latency in milliseconds, switching to seconds above 1s.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return "-".to_string();
    }
    if ms >= 1_000.0 {
        return format!("{:.2}s", ms / 1_000.0);
    }
    if ms >= 10.0 {
        return format!("{ms:.0}ms");
    }
    format!("{ms:.1}ms")
}

/// Single rounded component (`ms` below one second, `s` otherwise); short enough for progress lines.
pub(crate) fn format_elapsed(d: Duration) -> String {
    let ms = d.as_millis();
    if ms >= 1_000 {
        return format!("{}s", (ms + 500) / 1_000);
    }
    format!("{ms}ms")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_latencies_and_rates() {
        assert_eq!(format_ms(3.21), "3.2ms");
        assert_eq!(format_ms(42.4), "42ms");
        assert_eq!(format_ms(1_500.0), "1.50s");
        assert_eq!(format_ms(f64::NAN), "-");
        assert_eq!(format_rate(12.6), "13");
        assert_eq!(format_percent(12.5), "12.50%");
    }

    #[test]
    fn elapsed_rounds_to_one_unit() {
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250ms");
        assert_eq!(format_elapsed(Duration::from_millis(1_499)), "1s");
        assert_eq!(format_elapsed(Duration::from_millis(1_500)), "2s");
    }
}
