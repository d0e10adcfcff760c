use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::metrics::{MetricsSnapshot, RequestResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    /// Whole seconds since the plan started.
    pub bucket_secs: u64,
    pub active_users: u64,
    pub avg_latency_ms: f64,
    pub qps: f64,
    pub error_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub count: u64,
    pub errors: u64,
    pub total_latency_ms: i64,
}

/// Tally the results that completed within `interval` of `now`.
///
/// Walks backward from the newest entry and stops at the first one older than the window.
pub fn window_stats(results: &[RequestResult], now: Instant, interval: Duration) -> WindowStats {
    let cutoff = now.checked_sub(interval);
    let mut stats = WindowStats::default();

    for r in results.iter().rev() {
        if cutoff.is_some_and(|cutoff| r.end < cutoff) {
            break;
        }
        stats.count += 1;
        if !r.success {
            stats.errors += 1;
        }
        stats.total_latency_ms = stats.total_latency_ms.saturating_add(r.latency_ms);
    }

    stats
}

/// Turns periodic snapshots into per-interval trend points.
#[derive(Debug, Clone, Copy)]
pub struct TrendSampler {
    started: Instant,
    interval: Duration,
}

impl TrendSampler {
    pub fn new(started: Instant, interval: Duration) -> Self {
        Self { started, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn sample(&self, snapshot: &MetricsSnapshot, now: Instant, active_users: u64) -> TrendPoint {
        let w = window_stats(&snapshot.results, now, self.interval);
        let interval_secs = self.interval.as_secs_f64();

        let (qps, avg_latency_ms, error_percent) = if w.count == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let count = w.count as f64;
            (
                if interval_secs > 0.0 { count / interval_secs } else { 0.0 },
                w.total_latency_ms as f64 / count,
                100.0 * w.errors as f64 / count,
            )
        };

        TrendPoint {
            bucket_secs: now.saturating_duration_since(self.started).as_secs(),
            active_users,
            avg_latency_ms,
            qps,
            error_percent,
        }
    }
}

/// Trend points of a whole run, one per time bucket.
#[derive(Debug, Clone, Default)]
pub struct TrendSeries {
    points: BTreeMap<u64, TrendPoint>,
}

impl TrendSeries {
    /// Later samples for the same bucket replace earlier ones.
    pub fn upsert(&mut self, point: TrendPoint) {
        self.points.insert(point.bucket_secs, point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> Vec<TrendPoint> {
        self.points.values().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64, success: bool, latency_ms: i64) -> RequestResult {
        RequestResult {
            end: base + Duration::from_millis(ms),
            success,
            latency_ms,
        }
    }

    #[test]
    fn window_only_counts_the_last_interval() {
        let base = Instant::now();
        let results = vec![
            at(base, 100, true, 500),
            at(base, 1_200, true, 10),
            at(base, 1_500, false, 30),
            at(base, 1_900, true, 20),
        ];

        let now = base + Duration::from_millis(2_000);
        let w = window_stats(&results, now, Duration::from_secs(1));
        assert_eq!(
            w,
            WindowStats {
                count: 3,
                errors: 1,
                total_latency_ms: 60,
            }
        );
    }

    #[test]
    fn sample_derives_rates_from_the_window() {
        let base = Instant::now();
        let snapshot = MetricsSnapshot {
            results: vec![
                at(base, 1_100, true, 10),
                at(base, 1_600, false, 50),
                at(base, 2_500, true, 30),
                at(base, 2_900, true, 30),
            ],
            ..MetricsSnapshot::default()
        };

        let sampler = TrendSampler::new(base, Duration::from_secs(2));
        let point = sampler.sample(&snapshot, base + Duration::from_millis(3_000), 7);

        assert_eq!(point.bucket_secs, 3);
        assert_eq!(point.active_users, 7);
        assert!((point.qps - 2.0).abs() < f64::EPSILON);
        assert!((point.avg_latency_ms - 30.0).abs() < f64::EPSILON);
        assert!((point.error_percent - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_window_is_all_zero() {
        let base = Instant::now();
        let sampler = TrendSampler::new(base, Duration::from_secs(1));
        let point = sampler.sample(&MetricsSnapshot::default(), base, 0);
        assert_eq!(point.qps, 0.0);
        assert_eq!(point.avg_latency_ms, 0.0);
        assert_eq!(point.error_percent, 0.0);
    }

    #[test]
    fn series_upserts_by_bucket() {
        let mut series = TrendSeries::default();
        let p = |bucket_secs, qps| TrendPoint {
            bucket_secs,
            active_users: 1,
            avg_latency_ms: 0.0,
            qps,
            error_percent: 0.0,
        };

        series.upsert(p(1, 10.0));
        series.upsert(p(2, 20.0));
        series.upsert(p(1, 15.0));

        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0].qps, 15.0);
        assert_eq!(series.points()[1].bucket_secs, 2);
    }
}
