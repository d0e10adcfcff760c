use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::gate::{IterationGate, StopReason};
use crate::iteration::RequestIterationRunner;
use crate::progress::{ProgressFn, ProgressUpdate};

/// Plan-wide worker counters.
pub struct PlanActivity {
    active: AtomicU64,
    peak: AtomicU64,
    total_target: u64,
    on_progress: Option<ProgressFn>,
}

impl PlanActivity {
    pub fn new(total_target: u64, on_progress: Option<ProgressFn>) -> Self {
        Self {
            active: AtomicU64::new(0),
            peak: AtomicU64::new(0),
            total_target,
            on_progress,
        }
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn total_target(&self) -> u64 {
        self.total_target
    }

    fn enter(&self) -> u64 {
        let new_active = self.active.fetch_add(1, Ordering::Relaxed).saturating_add(1);

        // CAS loop to keep the max without races.
        let mut cur = self.peak.load(Ordering::Relaxed);
        while new_active > cur {
            match self.peak.compare_exchange_weak(
                cur,
                new_active,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }

        new_active
    }

    fn exit(&self) -> u64 {
        self.active.fetch_sub(1, Ordering::Relaxed).saturating_sub(1)
    }
}

impl std::fmt::Debug for PlanActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanActivity")
            .field("active", &self.active())
            .field("peak", &self.peak())
            .field("total_target", &self.total_target)
            .finish_non_exhaustive()
    }
}

/// Worker counter of one thread group, rolled up into its plan.
#[derive(Debug)]
pub struct GroupActivity {
    group: Arc<str>,
    active: AtomicU64,
    plan: Arc<PlanActivity>,
}

impl GroupActivity {
    pub fn new(group: Arc<str>, plan: Arc<PlanActivity>) -> Self {
        Self {
            group,
            active: AtomicU64::new(0),
            plan,
        }
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    /// Count the caller as active until the returned guard is dropped.
    pub fn enter(self: &Arc<Self>) -> ActiveWorkerGuard {
        let group_active = self.active.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let active = self.plan.enter();
        self.notify(group_active, active);

        ActiveWorkerGuard {
            activity: self.clone(),
        }
    }

    fn notify(&self, group_active: u64, active: u64) {
        if let Some(on_progress) = &self.plan.on_progress {
            on_progress(ProgressUpdate {
                group: self.group.clone(),
                group_active,
                active,
                total_target: self.plan.total_target,
            });
        }
    }
}

pub struct ActiveWorkerGuard {
    activity: Arc<GroupActivity>,
}

impl Drop for ActiveWorkerGuard {
    fn drop(&mut self) {
        let group_active = self
            .activity
            .active
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        let active = self.activity.plan.exit();
        self.activity.notify(group_active, active);
    }
}

/// One virtual user: iterates its group's chains until the gate closes.
pub struct VirtualUserWorker {
    id: u64,
    runner: Arc<RequestIterationRunner>,
    gate: IterationGate,
    activity: Arc<GroupActivity>,
}

impl VirtualUserWorker {
    pub fn new(
        id: u64,
        runner: Arc<RequestIterationRunner>,
        gate: IterationGate,
        activity: Arc<GroupActivity>,
    ) -> Self {
        Self {
            id,
            runner,
            gate,
            activity,
        }
    }

    /// Returns the number of iterations started.
    pub async fn run(self) -> u64 {
        let _active = self.activity.enter();
        let mut iterations: u64 = 0;

        let reason: StopReason = loop {
            if let Some(reason) = self.gate.stop_reason(iterations) {
                break reason;
            }

            let gate = &self.gate;
            self.runner
                .run_iteration(|| gate.stop_reason(iterations).is_some())
                .await;
            iterations = iterations.saturating_add(1);
        };

        tracing::debug!(
            group = %self.runner.group(),
            worker = self.id,
            iterations,
            reason = %reason,
            "worker exited"
        );
        iterations
    }
}
