use serde::Serialize;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use volley_core::{EndpointSummary, MetricsSnapshot, PlanSummary, TrendPoint};

use super::OutputFormatter;

pub(crate) struct JsonOutput {
    threads: Arc<ThreadCounts>,
}

#[derive(Default)]
struct ThreadCounts {
    active: AtomicU64,
    total_target: AtomicU64,
}

impl JsonOutput {
    pub(crate) fn new() -> Self {
        Self {
            threads: Arc::new(ThreadCounts::default()),
        }
    }
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _plan_path: &Path, _groups: &[volley_core::ThreadGroupPlan]) {}

    fn callbacks(&self) -> volley_core::PlanCallbacks {
        let on_threads = self.threads.clone();
        let on_report = self.threads.clone();

        volley_core::PlanCallbacks::default()
            .on_progress(move |u| {
                on_threads.active.store(u.active, Ordering::Relaxed);
                on_threads.total_target.store(u.total_target, Ordering::Relaxed);
            })
            .on_report(move |snapshot| {
                let line = build_progress_line(
                    snapshot,
                    on_report.active.load(Ordering::Relaxed),
                    on_report.total_target.load(Ordering::Relaxed),
                );
                emit_json_line(&line);
            })
            .on_trend(|p| emit_json_line(&build_trend_line(p)))
    }

    fn print_summary(&self, summary: &PlanSummary) -> anyhow::Result<()> {
        let line = build_summary_line(summary);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub active_threads: u64,
    pub total_target_threads: u64,
    pub total_requests: u64,
    pub total_failures: u64,
    pub endpoints: u64,
}

fn build_progress_line(
    snapshot: &MetricsSnapshot,
    active_threads: u64,
    total_target_threads: u64,
) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        active_threads,
        total_target_threads,
        total_requests: snapshot.total_requests(),
        total_failures: snapshot.total_failures(),
        endpoints: snapshot.endpoints.len() as u64,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTrendLine {
    pub kind: &'static str,
    pub elapsed_secs: u64,
    pub active_users: u64,
    pub qps: f64,
    pub avg_latency_ms: f64,
    pub error_percent: f64,
}

fn build_trend_line(p: TrendPoint) -> JsonTrendLine {
    JsonTrendLine {
        kind: "trend",
        elapsed_secs: p.bucket_secs,
        active_users: p.active_users,
        qps: p.qps,
        avg_latency_ms: p.avg_latency_ms,
        error_percent: p.error_percent,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub elapsed_secs: f64,
    pub stopped: bool,
    pub total_target_threads: u64,
    pub peak_active_threads: u64,
    pub endpoints: Vec<JsonEndpointSummary>,
    pub totals: JsonEndpointSummary,
    pub trend_points: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonEndpointSummary {
    pub name: String,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub error_percent: f64,
    pub throughput: f64,

    pub latency_min: Option<f64>,
    pub latency_mean: Option<f64>,
    pub latency_max: Option<f64>,
    pub latency_p50: Option<f64>,
    pub latency_p90: Option<f64>,
    pub latency_p95: Option<f64>,
    pub latency_p99: Option<f64>,
}

impl From<&EndpointSummary> for JsonEndpointSummary {
    fn from(e: &EndpointSummary) -> Self {
        let l = e.latency.as_ref();
        Self {
            name: e.name.clone(),
            requests: e.requests,
            successes: e.successes,
            failures: e.failures,
            error_percent: e.error_percent,
            throughput: e.throughput,
            latency_min: l.map(|l| l.min),
            latency_mean: l.map(|l| l.mean),
            latency_max: l.map(|l| l.max),
            latency_p50: l.map(|l| l.p50),
            latency_p90: l.map(|l| l.p90),
            latency_p95: l.map(|l| l.p95),
            latency_p99: l.map(|l| l.p99),
        }
    }
}

fn build_summary_line(summary: &PlanSummary) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        elapsed_secs: summary.elapsed.as_secs_f64(),
        stopped: summary.stopped,
        total_target_threads: summary.total_target_threads,
        peak_active_threads: summary.peak_active_threads,
        endpoints: summary.endpoints.iter().map(Into::into).collect(),
        totals: (&summary.totals).into(),
        trend_points: summary.trend.len(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
