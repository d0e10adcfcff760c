use std::time::Duration;

use hdrhistogram::Histogram;

use crate::metrics::MetricsSnapshot;
use crate::trend::TrendPoint;

#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

const MAX_TRACKED_LATENCY_MS: u64 = 3_600_000;

/// Latency distribution of `latencies_ms`, `None` when empty.
pub fn summarize_latencies(latencies_ms: &[i64]) -> Option<LatencySummary> {
    if latencies_ms.is_empty() {
        return None;
    }

    // Milliseconds, capped at one hour.
    let mut h = Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_LATENCY_MS, 3).ok()?;
    for &v in latencies_ms {
        let v = u64::try_from(v).unwrap_or_else(|_| {
            tracing::trace!(latency_ms = v, "negative latency clamped to 0");
            0
        });
        h.saturating_record(v);
    }

    let q = |quantile| h.value_at_quantile(quantile) as f64;
    Some(LatencySummary {
        min: h.min() as f64,
        max: h.max() as f64,
        mean: h.mean(),
        stdev: h.stdev(),
        p50: q(0.50),
        p75: q(0.75),
        p90: q(0.90),
        p95: q(0.95),
        p99: q(0.99),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSummary {
    pub name: String,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub error_percent: f64,
    /// Requests per second over the whole run.
    pub throughput: f64,
    pub latency: Option<LatencySummary>,
}

impl EndpointSummary {
    fn from_parts(
        name: String,
        successes: u64,
        failures: u64,
        latencies: &[i64],
        elapsed: Duration,
    ) -> Self {
        let requests = successes.saturating_add(failures);
        let secs = elapsed.as_secs_f64();
        Self {
            name,
            requests,
            successes,
            failures,
            error_percent: if requests == 0 {
                0.0
            } else {
                100.0 * failures as f64 / requests as f64
            },
            throughput: if secs > 0.0 { requests as f64 / secs } else { 0.0 },
            latency: summarize_latencies(latencies),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub elapsed: Duration,
    /// The run was ended by a user stop rather than by its profiles.
    pub stopped: bool,
    pub total_target_threads: u64,
    pub peak_active_threads: u64,
    /// Sorted by endpoint name.
    pub endpoints: Vec<EndpointSummary>,
    pub totals: EndpointSummary,
    pub trend: Vec<TrendPoint>,
}

impl PlanSummary {
    pub fn build(
        snapshot: &MetricsSnapshot,
        elapsed: Duration,
        stopped: bool,
        total_target_threads: u64,
        peak_active_threads: u64,
        trend: Vec<TrendPoint>,
    ) -> Self {
        let endpoints = snapshot
            .endpoints
            .iter()
            .map(|(name, stats)| {
                EndpointSummary::from_parts(
                    name.to_string(),
                    stats.success_count,
                    stats.fail_count,
                    &stats.latencies,
                    elapsed,
                )
            })
            .collect();

        let all_latencies: Vec<i64> = snapshot.results.iter().map(|r| r.latency_ms).collect();
        let failures = snapshot.total_failures();
        let totals = EndpointSummary::from_parts(
            "total".to_string(),
            snapshot.total_requests().saturating_sub(failures),
            failures,
            &all_latencies,
            elapsed,
        );

        Self {
            elapsed,
            stopped,
            total_target_threads,
            peak_active_threads,
            endpoints,
            totals,
            trend,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.totals.failures > 0
    }
}
