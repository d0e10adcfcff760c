use std::sync::Arc;
use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::cancel::CancellationController;
use crate::config::{LoopLimit, ThreadGroupConfig, ThreadGroupPlan};
use crate::gate::{IterationGate, PlannedEnd};
use crate::iteration::{EngineContext, RequestIterationRunner};
use crate::schedule::{ConcurrencyProfile, Phase};
use crate::vu::{GroupActivity, PlanActivity, VirtualUserWorker};

struct WorkerHandle {
    planned_end: Arc<PlannedEnd>,
    task: AbortHandle,
}

impl WorkerHandle {
    fn is_retiring(&self) -> bool {
        self.planned_end.is_planned()
    }
}

/// Shared, immutable state of one running group.
struct GroupRuntime {
    name: Arc<str>,
    config: ThreadGroupConfig,
    scope: CancellationController,
    runner: Arc<RequestIterationRunner>,
    activity: Arc<GroupActivity>,
    tick: Duration,
}

/// Worker set of one group plus the bookkeeping needed to grow and retire it.
struct Population {
    rt: Arc<GroupRuntime>,
    started: Instant,
    workers: Vec<WorkerHandle>,
    tasks: JoinSet<u64>,
    next_id: u64,
}

impl Population {
    fn new(rt: Arc<GroupRuntime>, started: Instant) -> Self {
        Self {
            rt,
            started,
            workers: Vec::new(),
            tasks: JoinSet::new(),
            next_id: 1,
        }
    }

    fn spawn(&mut self, gate: IterationGate) {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);

        let planned_end = gate.planned_end().clone();
        let worker = VirtualUserWorker::new(
            id,
            self.rt.runner.clone(),
            gate,
            self.rt.activity.clone(),
        );
        let task = self.tasks.spawn(worker.run());
        self.workers.push(WorkerHandle { planned_end, task });
    }

    fn gate(&self) -> IterationGate {
        IterationGate::new(self.rt.scope.clone(), self.started)
    }

    /// Workers that are still expected to run indefinitely.
    fn unretired(&self) -> u64 {
        self.workers.iter().filter(|w| !w.is_retiring()).count() as u64
    }

    /// Ask the newest `count` unretired workers to exit, spreading their planned ends evenly
    /// over `(from, from + window]`.
    fn retire(&mut self, count: u64, from: Duration, window: Duration) {
        if count == 0 {
            return;
        }
        let window_ns = window.as_nanos();
        let mut assigned: u64 = 0;
        for w in self.workers.iter().rev() {
            if assigned >= count {
                break;
            }
            if w.is_retiring() {
                continue;
            }
            assigned += 1;
            let offset_ns = window_ns.saturating_mul(u128::from(assigned)) / u128::from(count);
            let at = from.saturating_add(Duration::from_nanos(
                u64::try_from(offset_ns).unwrap_or(u64::MAX),
            ));
            w.planned_end.retire_at(at);
        }
    }

    fn reap(&mut self) {
        while let Some(res) = self.tasks.try_join_next() {
            log_join(&self.rt.name, res);
        }
        self.workers.retain(|w| !w.task.is_finished());
    }

    async fn join(mut self) -> u64 {
        let mut iterations: u64 = 0;
        while let Some(res) = self.tasks.join_next().await {
            iterations = iterations.saturating_add(log_join(&self.rt.name, res));
        }
        iterations
    }
}

fn log_join(group: &str, res: Result<u64, tokio::task::JoinError>) -> u64 {
    match res {
        Ok(iterations) => iterations,
        Err(err) if err.is_cancelled() => 0,
        Err(err) => {
            tracing::warn!(group, error = %err, "worker task failed");
            0
        }
    }
}

/// Drives the worker population of one thread group along its concurrency profile.
pub struct ThreadGroupScheduler {
    name: Arc<str>,
    scope: CancellationController,
    activity: Arc<GroupActivity>,
    control: Option<JoinHandle<()>>,
}

impl ThreadGroupScheduler {
    /// Start scheduling `plan` on the current runtime and return immediately.
    ///
    /// An invalid group is logged and runs with zero workers.
    pub fn start(
        plan: ThreadGroupPlan,
        ctx: EngineContext,
        parent: &CancellationController,
        plan_activity: Arc<PlanActivity>,
        tick: Duration,
    ) -> Self {
        let name: Arc<str> = Arc::from(plan.name.as_str());
        let scope = parent.child();
        let activity = Arc::new(GroupActivity::new(name.clone(), plan_activity));

        let control = match plan.validate() {
            Ok(()) => {
                let runner = Arc::new(RequestIterationRunner::new(
                    name.clone(),
                    plan.chains.into(),
                    ctx,
                    scope.clone(),
                ));
                let rt = Arc::new(GroupRuntime {
                    name: name.clone(),
                    config: plan.config,
                    scope: scope.clone(),
                    runner,
                    activity: activity.clone(),
                    tick: tick.max(Duration::from_millis(1)),
                });
                tokio::spawn(control_loop(rt))
            }
            Err(err) => {
                tracing::warn!(group = %name, error = %err, "invalid thread group; no workers started");
                tokio::spawn(async {})
            }
        };

        Self {
            name,
            scope,
            activity,
            control: Some(control),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hard stop of this group only.
    pub fn stop(&self) {
        tracing::debug!(group = %self.name, "thread group stop requested");
        self.scope.stop();
    }

    pub fn active_count(&self) -> u64 {
        self.activity.active()
    }

    pub fn is_finished(&self) -> bool {
        self.control.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait until every worker of the group has exited. Returns `false` on timeout.
    pub async fn await_completion(&mut self, timeout: Duration) -> bool {
        let Some(control) = self.control.as_mut() else {
            return true;
        };

        match tokio::time::timeout(timeout, control).await {
            Ok(res) => {
                if let Err(err) = res {
                    tracing::warn!(group = %self.name, error = %err, "thread group control task failed");
                }
                self.control = None;
                true
            }
            Err(_) => false,
        }
    }

    /// Abort the control task and every worker it owns.
    pub fn abort(&mut self) {
        if let Some(control) = self.control.take() {
            control.abort();
        }
    }
}

impl Drop for ThreadGroupScheduler {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn control_loop(rt: Arc<GroupRuntime>) {
    let started = Instant::now();
    let profile = ConcurrencyProfile::new(&rt.config);
    tracing::info!(
        group = %rt.name,
        mode = %rt.config.kind(),
        max_threads = rt.config.max_threads(),
        "thread group started"
    );
    if let Some((up, hold, down)) = profile.spike_phases() {
        tracing::debug!(group = %rt.name, ?up, ?hold, ?down, "spike phases");
    }

    let iterations = match rt.config {
        ThreadGroupConfig::Fixed { threads, limit } => {
            run_fixed(&rt, started, threads, limit).await
        }
        _ => run_dynamic(&rt, started, &profile).await,
    };

    tracing::info!(
        group = %rt.name,
        iterations,
        elapsed_ms = started.elapsed().as_millis() as u64,
        stopped = !rt.scope.is_running(),
        "thread group finished"
    );
}

async fn run_fixed(rt: &Arc<GroupRuntime>, started: Instant, threads: u64, limit: LoopLimit) -> u64 {
    let mut population = Population::new(rt.clone(), started);
    for _ in 0..threads {
        let gate = population.gate();
        let gate = match limit {
            LoopLimit::Loops(loops) => gate.with_loops(loops),
            LoopLimit::Duration(d) => gate.with_duration(Some(d)),
        };
        population.spawn(gate);
    }
    population.join().await
}

async fn run_dynamic(rt: &Arc<GroupRuntime>, started: Instant, profile: &ConcurrencyProfile) -> u64 {
    let mut population = Population::new(rt.clone(), started);
    let total = profile.total_duration();

    let mut interval = tokio::time::interval(rt.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut phase: Option<Phase> = None;

    loop {
        tokio::select! {
            biased;
            _ = rt.scope.stopped() => {
                tracing::debug!(group = %rt.name, "scheduling halted by stop");
                break;
            }
            _ = interval.tick() => {}
        }

        let elapsed = started.elapsed();
        let current = profile.phase_at(elapsed);
        if phase != Some(current) {
            tracing::debug!(
                group = %rt.name,
                phase = %current,
                elapsed_ms = elapsed.as_millis() as u64,
                "phase"
            );
            phase = Some(current);
        }
        if current == Phase::Done {
            // Soft stop: workers finish their current iteration.
            rt.scope.request_stop();
            break;
        }

        population.reap();

        let target = profile.target_at(elapsed);
        let unretired = population.unretired();
        if unretired < target {
            tracing::trace!(group = %rt.name, from = unretired, to = target, "growing");
            for _ in unretired..target {
                let gate = population.gate().with_duration(total);
                population.spawn(gate);
            }
        }

        if profile.can_shrink() {
            // Look one tick ahead so retirements land before the next target is due.
            let next = match total {
                Some(total) => elapsed.saturating_add(rt.tick).min(total),
                None => elapsed.saturating_add(rt.tick),
            };
            let next_target = profile.target_at(next);
            let unretired = population.unretired();
            if unretired > next_target {
                let window = next.saturating_sub(elapsed);
                tracing::trace!(group = %rt.name, from = unretired, to = next_target, "retiring");
                population.retire(unretired - next_target, elapsed, window);
            }
        }
    }

    population.join().await
}
