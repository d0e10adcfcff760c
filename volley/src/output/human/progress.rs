use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use volley_core::TrendPoint;

use super::format::{format_elapsed, format_ms, format_percent, format_rate};

/// One progress line for the whole plan, fed by worker-count changes and trend samples.
pub(crate) struct HumanProgress {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    bar: Option<ProgressBar>,
    active: u64,
    total_target: u64,
    latest: Option<TrendPoint>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Bar when the plan length is known up front, spinner otherwise.
    pub(crate) fn start(&self, total: Option<Duration>) {
        let pb = match total {
            Some(total) => {
                let pb = ProgressBar::new(total.as_secs().max(1));
                pb.set_style(bar_style());
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(spinner_style());
                pb.enable_steady_tick(Duration::from_millis(120));
                pb
            }
        };
        pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        pb.set_prefix("plan");

        let mut inner = self.lock();
        inner.bar = Some(pb);
        inner.redraw();
    }

    pub(crate) fn set_threads(&self, active: u64, total_target: u64) {
        let mut inner = self.lock();
        inner.active = active;
        inner.total_target = total_target;
        inner.redraw();
    }

    pub(crate) fn set_trend(&self, point: TrendPoint) {
        let mut inner = self.lock();
        inner.latest = Some(point);
        if let Some(pb) = &inner.bar {
            pb.set_position(point.bucket_secs);
        }
        inner.redraw();
    }

    pub(crate) fn finish(&self) {
        let mut inner = self.lock();
        if let Some(pb) = inner.bar.take() {
            pb.finish_and_clear();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn redraw(&self) {
        let Some(pb) = &self.bar else {
            return;
        };
        pb.set_message(self.message());
    }

    fn message(&self) -> String {
        let mut msg = format!("threads={}/{}", self.active, self.total_target);
        if let Some(p) = &self.latest {
            msg.push_str(&format!(
                " qps={} avg={} errors={} elapsed={}",
                format_rate(p.qps),
                format_ms(p.avg_latency_ms),
                format_percent(p.error_percent),
                format_elapsed(Duration::from_secs(p.bucket_secs)),
            ));
        }
        msg
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
