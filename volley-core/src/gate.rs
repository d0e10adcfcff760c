use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::cancel::CancellationController;

const UNPLANNED: u64 = u64::MAX;

/// Planned retirement time of one worker, in milliseconds since its group started.
///
/// Starts out unplanned (run indefinitely). The scheduler sets it once to retire a worker softly.
#[derive(Debug)]
pub struct PlannedEnd(AtomicU64);

impl Default for PlannedEnd {
    fn default() -> Self {
        Self(AtomicU64::new(UNPLANNED))
    }
}

impl PlannedEnd {
    pub fn get(&self) -> Option<Duration> {
        match self.0.load(Ordering::Acquire) {
            UNPLANNED => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn is_planned(&self) -> bool {
        self.get().is_some()
    }

    /// Returns `false` if an end was already planned; the first plan wins.
    pub fn retire_at(&self, at: Duration) -> bool {
        let ms = u64::try_from(at.as_millis())
            .unwrap_or(UNPLANNED - 1)
            .min(UNPLANNED - 1);
        self.0
            .compare_exchange(UNPLANNED, ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn has_passed(&self, elapsed: Duration) -> bool {
        self.get().is_some_and(|end| elapsed >= end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    Stopped,
    LoopsReached,
    DurationElapsed,
    Retired,
}

/// Per-worker stop predicate, checked before and after every iteration.
#[derive(Debug, Clone)]
pub struct IterationGate {
    scope: CancellationController,
    started: Instant,
    loops: Option<u64>,
    duration: Option<Duration>,
    planned_end: Arc<PlannedEnd>,
}

impl IterationGate {
    pub fn new(scope: CancellationController, started: Instant) -> Self {
        Self {
            scope,
            started,
            loops: None,
            duration: None,
            planned_end: Arc::new(PlannedEnd::default()),
        }
    }

    #[must_use]
    pub fn with_loops(mut self, loops: u64) -> Self {
        self.loops = Some(loops);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn planned_end(&self) -> &Arc<PlannedEnd> {
        &self.planned_end
    }

    pub fn stop_reason(&self, iterations: u64) -> Option<StopReason> {
        if !self.scope.is_running() {
            return Some(StopReason::Stopped);
        }

        if self.loops.is_some_and(|loops| iterations >= loops) {
            return Some(StopReason::LoopsReached);
        }

        let elapsed = self.started.elapsed();
        if self.duration.is_some_and(|d| elapsed >= d) {
            return Some(StopReason::DurationElapsed);
        }

        if self.planned_end.has_passed(elapsed) {
            return Some(StopReason::Retired);
        }

        None
    }
}
