use std::time::Duration;

use crate::chain::RequestChain;
use crate::error::{Error, Result};

/// How long each worker of a [`ThreadGroupConfig::Fixed`] group keeps iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopLimit {
    /// Every worker runs exactly this many iterations.
    Loops(u64),
    /// Every worker iterates until the group has been running for this long.
    Duration(Duration),
}

/// One concurrency profile per thread group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadGroupConfig {
    Fixed {
        threads: u64,
        limit: LoopLimit,
    },

    /// Linear growth from `start_threads` to `end_threads` over `ramp`, then hold until `total`.
    RampUp {
        start_threads: u64,
        end_threads: u64,
        ramp: Duration,
        total: Duration,
    },

    /// Rise, hold and fall. The three phase lengths are proportions and get rescaled to `total`.
    Spike {
        min_threads: u64,
        max_threads: u64,
        ramp_up: Duration,
        hold: Duration,
        ramp_down: Duration,
        total: Duration,
    },

    /// Discrete steps of `step_size` threads, each held for `hold_per_step`.
    Stairs {
        start_threads: u64,
        end_threads: u64,
        step_size: u64,
        hold_per_step: Duration,
        total: Duration,
    },
}

/// Thread group mode (the string form used by plan files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ThreadGroupKind {
    #[strum(serialize = "fixed", serialize = "constant")]
    Fixed,

    #[strum(serialize = "ramp-up", serialize = "rampup", serialize = "ramp_up")]
    RampUp,

    #[strum(serialize = "spike")]
    Spike,

    #[strum(serialize = "stairs", serialize = "step")]
    Stairs,
}

impl ThreadGroupConfig {
    #[must_use]
    pub fn kind(&self) -> ThreadGroupKind {
        match self {
            Self::Fixed { .. } => ThreadGroupKind::Fixed,
            Self::RampUp { .. } => ThreadGroupKind::RampUp,
            Self::Spike { .. } => ThreadGroupKind::Spike,
            Self::Stairs { .. } => ThreadGroupKind::Stairs,
        }
    }

    /// Largest population the profile can ask for.
    #[must_use]
    pub fn max_threads(&self) -> u64 {
        match self {
            Self::Fixed { threads, .. } => *threads,
            Self::RampUp {
                start_threads,
                end_threads,
                ..
            }
            | Self::Stairs {
                start_threads,
                end_threads,
                ..
            } => (*end_threads).max(*start_threads),
            Self::Spike {
                min_threads,
                max_threads,
                ..
            } => (*max_threads).max(*min_threads),
        }
    }

    /// Wall-clock bound of the group, if it has one. Loop-bound fixed groups have none.
    #[must_use]
    pub fn total_duration(&self) -> Option<Duration> {
        match self {
            Self::Fixed {
                limit: LoopLimit::Loops(_),
                ..
            } => None,
            Self::Fixed {
                limit: LoopLimit::Duration(d),
                ..
            } => Some(*d),
            Self::RampUp { total, .. } | Self::Spike { total, .. } | Self::Stairs { total, .. } => {
                Some(*total)
            }
        }
    }

    pub fn validate(&self, group: &str) -> Result<()> {
        let threads = |field: &'static str| Error::InvalidThreads {
            group: group.to_string(),
            field,
        };
        let duration = |field: &'static str| Error::InvalidDuration {
            group: group.to_string(),
            field,
        };
        let range = |lower: &'static str, upper: &'static str| Error::InvalidRange {
            group: group.to_string(),
            lower,
            upper,
        };

        match self {
            Self::Fixed { threads: n, limit } => {
                if *n == 0 {
                    return Err(threads("threads"));
                }
                match limit {
                    LoopLimit::Loops(0) => Err(Error::InvalidLoops {
                        group: group.to_string(),
                    }),
                    LoopLimit::Duration(d) if d.is_zero() => Err(duration("duration")),
                    _ => Ok(()),
                }
            }
            Self::RampUp {
                start_threads,
                end_threads,
                total,
                ..
            } => {
                if *end_threads == 0 {
                    return Err(threads("end_threads"));
                }
                if end_threads < start_threads {
                    return Err(range("start_threads", "end_threads"));
                }
                if total.is_zero() {
                    return Err(duration("total_duration"));
                }
                Ok(())
            }
            Self::Spike {
                min_threads,
                max_threads,
                total,
                ..
            } => {
                if *max_threads == 0 {
                    return Err(threads("max_threads"));
                }
                if max_threads < min_threads {
                    return Err(range("min_threads", "max_threads"));
                }
                if total.is_zero() {
                    return Err(duration("total_duration"));
                }
                Ok(())
            }
            Self::Stairs {
                start_threads,
                end_threads,
                step_size,
                hold_per_step,
                total,
            } => {
                if *end_threads == 0 {
                    return Err(threads("end_threads"));
                }
                if *step_size == 0 {
                    return Err(threads("step_size"));
                }
                if end_threads < start_threads {
                    return Err(range("start_threads", "end_threads"));
                }
                if hold_per_step.is_zero() {
                    return Err(duration("hold_per_step"));
                }
                if total.is_zero() {
                    return Err(duration("total_duration"));
                }
                Ok(())
            }
        }
    }
}

/// A named thread group: one profile plus the ordered requests each iteration walks through.
#[derive(Debug, Clone)]
pub struct ThreadGroupPlan {
    pub name: String,
    pub enabled: bool,
    pub config: ThreadGroupConfig,
    pub chains: Vec<RequestChain>,
}

impl ThreadGroupPlan {
    pub fn new(name: impl Into<String>, config: ThreadGroupConfig) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            config,
            chains: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_chain(mut self, chain: RequestChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.config.validate(&self.name)?;
        if self.chains.is_empty() {
            return Err(Error::EmptyChain {
                group: self.name.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Cadence of the periodic report callback.
    pub report_interval: Duration,
    /// Cadence (and window length) of trend sampling.
    pub trend_interval: Duration,
    /// Scheduler control-loop period.
    pub tick: Duration,
    /// How long a stop may take before in-flight calls are force-cancelled.
    pub stop_timeout: Duration,
    /// Extra wait granted after a forced cancellation.
    pub force_cancel_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            report_interval: Duration::from_secs(1),
            trend_interval: Duration::from_secs(1),
            tick: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
            force_cancel_grace: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_plan_spellings() {
        assert_eq!("fixed".parse::<ThreadGroupKind>().ok(), Some(ThreadGroupKind::Fixed));
        assert_eq!("ramp-up".parse::<ThreadGroupKind>().ok(), Some(ThreadGroupKind::RampUp));
        assert_eq!("spike".parse::<ThreadGroupKind>().ok(), Some(ThreadGroupKind::Spike));
        assert_eq!("stairs".parse::<ThreadGroupKind>().ok(), Some(ThreadGroupKind::Stairs));
        assert!("arrival-rate".parse::<ThreadGroupKind>().is_err());
    }

    #[test]
    fn max_threads_per_mode() {
        let fixed = ThreadGroupConfig::Fixed {
            threads: 4,
            limit: LoopLimit::Loops(1),
        };
        assert_eq!(fixed.max_threads(), 4);
        assert_eq!(fixed.total_duration(), None);

        let spike = ThreadGroupConfig::Spike {
            min_threads: 2,
            max_threads: 9,
            ramp_up: Duration::from_secs(1),
            hold: Duration::from_secs(1),
            ramp_down: Duration::from_secs(1),
            total: Duration::from_secs(30),
        };
        assert_eq!(spike.max_threads(), 9);
        assert_eq!(spike.total_duration(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_sized_groups_are_rejected() {
        let fixed = ThreadGroupConfig::Fixed {
            threads: 0,
            limit: LoopLimit::Loops(1),
        };
        assert!(matches!(
            fixed.validate("g"),
            Err(Error::InvalidThreads { field: "threads", .. })
        ));

        let ramp = ThreadGroupConfig::RampUp {
            start_threads: 5,
            end_threads: 2,
            ramp: Duration::from_secs(1),
            total: Duration::from_secs(2),
        };
        assert!(matches!(ramp.validate("g"), Err(Error::InvalidRange { .. })));

        let stairs = ThreadGroupConfig::Stairs {
            start_threads: 1,
            end_threads: 5,
            step_size: 1,
            hold_per_step: Duration::ZERO,
            total: Duration::from_secs(10),
        };
        assert!(matches!(
            stairs.validate("g"),
            Err(Error::InvalidDuration { field: "hold_per_step", .. })
        ));
    }

    #[test]
    fn group_without_requests_is_rejected() {
        let plan = ThreadGroupPlan::new(
            "empty",
            ThreadGroupConfig::Fixed {
                threads: 1,
                limit: LoopLimit::Loops(1),
            },
        );
        assert!(matches!(plan.validate(), Err(Error::EmptyChain { .. })));
    }
}
