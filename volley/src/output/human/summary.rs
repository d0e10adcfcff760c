use std::fmt::Write as _;

use volley_core::{EndpointSummary, PlanSummary};

use super::format::{format_elapsed, format_ms, format_percent, format_rate};

pub(crate) fn render(summary: &PlanSummary) -> String {
    let mut out = String::new();

    if summary.endpoints.is_empty() {
        out.push_str("summary: no requests recorded\n");
        render_run(summary, &mut out);
        return out;
    }

    out.push_str("summary\n");
    for e in &summary.endpoints {
        writeln!(&mut out, "endpoint: {}", e.name).ok();
        render_endpoint(e, &mut out);
        out.push('\n');
    }

    out.push_str("totals\n");
    render_endpoint(&summary.totals, &mut out);
    render_run(summary, &mut out);

    out
}

fn render_endpoint(e: &EndpointSummary, out: &mut String) {
    writeln!(
        out,
        "  requests: {} (failed {}, {})",
        e.requests,
        e.failures,
        format_percent(e.error_percent)
    )
    .ok();
    writeln!(out, "  throughput: {} req/s", format_rate(e.throughput)).ok();

    match &e.latency {
        Some(l) => {
            writeln!(
                out,
                "  latency = p50={} p90={} p95={} p99={} mean={} max={}",
                format_ms(l.p50),
                format_ms(l.p90),
                format_ms(l.p95),
                format_ms(l.p99),
                format_ms(l.mean),
                format_ms(l.max),
            )
            .ok();
        }
        None => out.push_str("  latency: n/a\n"),
    }
}

fn render_run(summary: &PlanSummary, out: &mut String) {
    writeln!(out, "  elapsed: {}", format_elapsed(summary.elapsed)).ok();
    writeln!(
        out,
        "  threads: peak {} of {}",
        summary.peak_active_threads, summary.total_target_threads
    )
    .ok();
    if summary.stopped {
        out.push_str("  stopped by user\n");
    }
}
