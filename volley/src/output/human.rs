use std::path::Path;
use std::sync::Arc;

mod format;
mod progress;
mod summary;

use progress::HumanProgress;
use summary::render;

use super::{OutputFormatter, plan_duration};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, plan_path: &Path, groups: &[volley_core::ThreadGroupPlan]) {
        println!("plan: {}", plan_path.display());
        for g in groups {
            let state = if g.enabled { "" } else { " (disabled)" };
            let limit = match g.config.total_duration() {
                Some(d) => format!("duration={d:?}"),
                None => "duration=until loops complete".to_string(),
            };
            println!(
                "thread group: {} mode={} max_threads={} {limit} requests={}{state}",
                g.name,
                g.config.kind(),
                g.config.max_threads(),
                g.chains.len(),
            );
        }
        if !groups.is_empty() {
            println!();
        }

        self.progress.start(plan_duration(groups));
    }

    fn callbacks(&self) -> volley_core::PlanCallbacks {
        let on_threads = self.progress.clone();
        let on_trend = self.progress.clone();

        volley_core::PlanCallbacks::default()
            .on_progress(move |u| on_threads.set_threads(u.active, u.total_target))
            .on_trend(move |p| on_trend.set_trend(p))
    }

    fn print_summary(&self, summary: &volley_core::PlanSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));
        Ok(())
    }
}
