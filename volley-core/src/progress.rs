use std::sync::Arc;

use crate::iteration::RequestRecord;
use crate::metrics::MetricsSnapshot;
use crate::trend::TrendPoint;

#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Group whose population just changed.
    pub group: Arc<str>,
    pub group_active: u64,
    /// Active workers across the whole plan.
    pub active: u64,
    pub total_target: u64,
}

/// Called on every active-worker change. Runs on the worker's task, so it must not block.
pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

/// Called on the report cadence with a fresh snapshot. Runs on the blocking pool; a tick is
/// skipped while the previous call is still running.
pub type ReportFn = Arc<dyn Fn(&MetricsSnapshot) + Send + Sync + 'static>;

pub type TrendFn = Arc<dyn Fn(TrendPoint) + Send + Sync + 'static>;

/// Called once per recorded request step.
pub type ResultFn = Arc<dyn Fn(&RequestRecord) + Send + Sync + 'static>;

#[derive(Clone, Default)]
pub struct PlanCallbacks {
    pub on_progress: Option<ProgressFn>,
    pub on_report: Option<ReportFn>,
    pub on_trend: Option<TrendFn>,
    pub on_result: Option<ResultFn>,
}

impl PlanCallbacks {
    #[must_use]
    pub fn on_progress(mut self, f: impl Fn(ProgressUpdate) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_report(mut self, f: impl Fn(&MetricsSnapshot) + Send + Sync + 'static) -> Self {
        self.on_report = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_trend(mut self, f: impl Fn(TrendPoint) + Send + Sync + 'static) -> Self {
        self.on_trend = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_result(mut self, f: impl Fn(&RequestRecord) + Send + Sync + 'static) -> Self {
        self.on_result = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for PlanCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_report", &self.on_report.is_some())
            .field("on_trend", &self.on_trend.is_some())
            .field("on_result", &self.on_result.is_some())
            .finish()
    }
}
