use crate::cli::OutputFormat;
use std::path::Path;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, plan_path: &Path, groups: &[volley_core::ThreadGroupPlan]);
    /// Engine callbacks that feed this formatter while the plan runs.
    fn callbacks(&self) -> volley_core::PlanCallbacks;
    fn print_summary(&self, summary: &volley_core::PlanSummary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput::new()),
    }
}

/// Longest run time of the enabled groups, if every one of them is time-bounded.
pub(crate) fn plan_duration(groups: &[volley_core::ThreadGroupPlan]) -> Option<std::time::Duration> {
    groups
        .iter()
        .filter(|g| g.enabled)
        .map(|g| g.config.total_duration())
        .try_fold(std::time::Duration::ZERO, |acc, d| d.map(|d| acc.max(d)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use volley_core::{LoopLimit, ThreadGroupConfig, ThreadGroupPlan};

    fn fixed(limit: LoopLimit) -> ThreadGroupPlan {
        ThreadGroupPlan::new("g", ThreadGroupConfig::Fixed { threads: 1, limit })
    }

    #[test]
    fn plan_duration_is_the_longest_group() {
        let groups = vec![
            fixed(LoopLimit::Duration(Duration::from_secs(5))),
            fixed(LoopLimit::Duration(Duration::from_secs(9))),
        ];
        assert_eq!(plan_duration(&groups), Some(Duration::from_secs(9)));
    }

    #[test]
    fn loop_bounded_group_has_no_known_duration() {
        let mut disabled = fixed(LoopLimit::Loops(3));
        disabled.enabled = false;
        let groups = vec![fixed(LoopLimit::Duration(Duration::from_secs(5))), disabled];
        assert_eq!(plan_duration(&groups), Some(Duration::from_secs(5)));

        let groups = vec![fixed(LoopLimit::Loops(3))];
        assert_eq!(plan_duration(&groups), None);
    }
}
