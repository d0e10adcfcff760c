use std::time::Duration;

use crate::config::{LoopLimit, ThreadGroupConfig};

/// Coarse position inside a profile, used for logging and progress display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    Steady,
    RampUp,
    Hold,
    RampDown,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Fixed {
        threads: u64,
        total: Option<Duration>,
    },
    RampUp {
        start: u64,
        end: u64,
        ramp: Duration,
        total: Duration,
    },
    Spike {
        min: u64,
        max: u64,
        up: Duration,
        hold: Duration,
        down: Duration,
        total: Duration,
    },
    Stairs {
        start: u64,
        end: u64,
        step: u64,
        hold: Duration,
        total: Duration,
    },
}

/// Target-concurrency curve of one thread group over time since the group started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyProfile {
    shape: Shape,
}

impl ConcurrencyProfile {
    pub fn new(config: &ThreadGroupConfig) -> Self {
        let shape = match *config {
            ThreadGroupConfig::Fixed { threads, limit } => Shape::Fixed {
                threads,
                total: match limit {
                    LoopLimit::Loops(_) => None,
                    LoopLimit::Duration(d) => Some(d),
                },
            },
            ThreadGroupConfig::RampUp {
                start_threads,
                end_threads,
                ramp,
                total,
            } => Shape::RampUp {
                start: start_threads,
                end: end_threads.max(start_threads),
                ramp,
                total,
            },
            ThreadGroupConfig::Spike {
                min_threads,
                max_threads,
                ramp_up,
                hold,
                ramp_down,
                total,
            } => {
                let (up, hold, down) = rescale_phases(ramp_up, hold, ramp_down, total);
                Shape::Spike {
                    min: min_threads,
                    max: max_threads.max(min_threads),
                    up,
                    hold,
                    down,
                    total,
                }
            }
            ThreadGroupConfig::Stairs {
                start_threads,
                end_threads,
                step_size,
                hold_per_step,
                total,
            } => Shape::Stairs {
                start: start_threads,
                end: end_threads.max(start_threads),
                step: step_size,
                hold: hold_per_step,
                total,
            },
        };

        Self { shape }
    }

    pub fn total_duration(&self) -> Option<Duration> {
        match self.shape {
            Shape::Fixed { total, .. } => total,
            Shape::RampUp { total, .. } | Shape::Spike { total, .. } | Shape::Stairs { total, .. } => {
                Some(total)
            }
        }
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        self.total_duration().is_some_and(|total| elapsed >= total)
    }

    /// Only spike groups retire workers before the group ends.
    pub fn can_shrink(&self) -> bool {
        matches!(self.shape, Shape::Spike { .. })
    }

    /// Spike phase lengths after rescaling to the total duration.
    pub fn spike_phases(&self) -> Option<(Duration, Duration, Duration)> {
        match self.shape {
            Shape::Spike { up, hold, down, .. } => Some((up, hold, down)),
            _ => None,
        }
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        match self.shape {
            Shape::Fixed { threads, .. } => threads,
            Shape::RampUp {
                start,
                end,
                ramp,
                ..
            } => {
                if ramp.is_zero() {
                    return end;
                }
                interpolate(start, end, elapsed.min(ramp), ramp)
            }
            Shape::Spike {
                min,
                max,
                up,
                hold,
                down,
                ..
            } => {
                if elapsed < up {
                    return interpolate(min, max, elapsed, up);
                }
                let hold_end = up.saturating_add(hold);
                if elapsed < hold_end {
                    return max;
                }
                let down_elapsed = elapsed.saturating_sub(hold_end);
                if down_elapsed < down {
                    return interpolate(max, min, down_elapsed, down);
                }
                min
            }
            Shape::Stairs {
                start,
                end,
                step,
                hold,
                ..
            } => {
                let hold_ns = hold.as_nanos().max(1);
                let steps = elapsed.as_nanos() / hold_ns;
                let steps = u64::try_from(steps).unwrap_or(u64::MAX);
                start.saturating_add(step.saturating_mul(steps)).min(end)
            }
        }
    }

    pub fn phase_at(&self, elapsed: Duration) -> Phase {
        if self.is_done(elapsed) {
            return Phase::Done;
        }

        match self.shape {
            Shape::Fixed { .. } => Phase::Steady,
            Shape::RampUp { ramp, .. } => {
                if elapsed < ramp {
                    Phase::RampUp
                } else {
                    Phase::Hold
                }
            }
            Shape::Spike { up, hold, .. } => {
                if elapsed < up {
                    Phase::RampUp
                } else if elapsed < up.saturating_add(hold) {
                    Phase::Hold
                } else {
                    Phase::RampDown
                }
            }
            Shape::Stairs { end, .. } => {
                if self.target_at(elapsed) < end {
                    Phase::RampUp
                } else {
                    Phase::Hold
                }
            }
        }
    }
}

/// Scale `up : hold : down` so the three phases add up to `total`.
///
/// Rounding leftovers go to the ramp-down phase. A profile with all three phases at zero is
/// treated as one long hold.
fn rescale_phases(
    up: Duration,
    hold: Duration,
    down: Duration,
    total: Duration,
) -> (Duration, Duration, Duration) {
    let sum = up.as_nanos() + hold.as_nanos() + down.as_nanos();
    if sum == 0 {
        return (Duration::ZERO, total, Duration::ZERO);
    }

    let total_ns = total.as_nanos();
    let scale = |part: Duration| -> Duration {
        let ns = total_ns.saturating_mul(part.as_nanos()) / sum;
        Duration::from_nanos(u64::try_from(ns).unwrap_or(u64::MAX))
    };

    let up = scale(up);
    let hold = scale(hold);
    let down = total.saturating_sub(up).saturating_sub(hold);
    (up, hold, down)
}

/// `from + floor((to - from) * num / den)`, in either direction.
fn interpolate(from: u64, to: u64, num: Duration, den: Duration) -> u64 {
    let from_i = from as i128;
    let delta = to as i128 - from_i;

    let num = num.as_nanos() as i128;
    let den = (den.as_nanos() as i128).max(1);

    // Floor toward the start so a falling ramp never undershoots its target.
    let step = if delta >= 0 {
        delta.saturating_mul(num) / den
    } else {
        -((-delta).saturating_mul(num) / den)
    };

    (from_i + step).clamp(0, u64::MAX as i128) as u64
}
