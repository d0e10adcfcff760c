use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cancel::CancellationController;
use crate::config::{RunOptions, ThreadGroupPlan};
use crate::error::{Error, Result};
use crate::iteration::EngineContext;
use crate::metrics::MetricsAggregator;
use crate::progress::{PlanCallbacks, ReportFn, TrendFn};
use crate::scheduler::ThreadGroupScheduler;
use crate::summary::PlanSummary;
use crate::trend::{TrendSampler, TrendSeries};
use crate::vu::PlanActivity;

/// Start every enabled group of a plan concurrently and return immediately.
///
/// Groups that fail validation are logged and contribute no workers; the rest of the plan runs.
pub fn start_plan(
    groups: Vec<ThreadGroupPlan>,
    mut ctx: EngineContext,
    options: RunOptions,
    callbacks: PlanCallbacks,
) -> PlanHandle {
    ctx.metrics.reset();
    if callbacks.on_result.is_some() {
        ctx.on_result = callbacks.on_result.clone();
    }

    let total_target = groups
        .iter()
        .filter(|g| g.enabled && g.validate().is_ok())
        .fold(0u64, |acc, g| acc.saturating_add(g.config.max_threads()));

    let controller = CancellationController::new();
    let activity = Arc::new(PlanActivity::new(total_target, callbacks.on_progress.clone()));
    let started = Instant::now();

    let mut schedulers = Vec::with_capacity(groups.len());
    for group in groups {
        if !group.enabled {
            tracing::debug!(group = %group.name, "thread group disabled; skipping");
            continue;
        }
        schedulers.push(ThreadGroupScheduler::start(
            group,
            ctx.clone(),
            &controller,
            activity.clone(),
            options.tick,
        ));
    }

    tracing::info!(
        groups = schedulers.len(),
        total_target_threads = total_target,
        "plan started"
    );

    let trend = Arc::new(Mutex::new(TrendSeries::default()));
    let finished = CancellationToken::new();
    let mut background = Vec::new();

    background.push(tokio::spawn(trend_loop(
        TrendSampler::new(started, options.trend_interval),
        ctx.metrics.clone(),
        activity.clone(),
        trend.clone(),
        callbacks.on_trend.clone(),
        finished.clone(),
    )));

    if let Some(on_report) = callbacks.on_report.clone() {
        background.push(tokio::spawn(report_loop(
            options.report_interval,
            ctx.metrics.clone(),
            on_report,
            finished.clone(),
        )));
    }

    PlanHandle {
        controller,
        schedulers,
        activity,
        metrics: ctx.metrics,
        trend,
        started,
        options,
        finished,
        background,
    }
}

async fn trend_loop(
    sampler: TrendSampler,
    metrics: Arc<MetricsAggregator>,
    activity: Arc<PlanActivity>,
    series: Arc<Mutex<TrendSeries>>,
    on_trend: Option<TrendFn>,
    finished: CancellationToken,
) {
    let mut interval = tokio::time::interval(sampler.interval().max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; there is nothing to sample yet.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = finished.cancelled() => break,
            _ = interval.tick() => {}
        }

        let snapshot = metrics.snapshot();
        let point = sampler.sample(&snapshot, Instant::now(), activity.active());
        series.lock().upsert(point);
        if let Some(on_trend) = &on_trend {
            on_trend(point);
        }
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn report_loop(
    period: Duration,
    metrics: Arc<MetricsAggregator>,
    on_report: ReportFn,
    finished: CancellationToken,
) {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    let busy = Arc::new(AtomicBool::new(false));
    let mut pending: Option<JoinHandle<()>> = None;
    loop {
        tokio::select! {
            biased;
            _ = finished.cancelled() => break,
            _ = interval.tick() => {}
        }

        if busy.swap(true, Ordering::AcqRel) {
            tracing::trace!("previous report still running; skipping tick");
            continue;
        }

        let guard = BusyGuard(busy.clone());
        let metrics = metrics.clone();
        let on_report = on_report.clone();
        pending = Some(tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let snapshot = metrics.snapshot();
            on_report(&snapshot);
        }));
    }

    // A report that is still running must not outlive the plan.
    if let Some(report) = pending
        && let Err(err) = report.await
    {
        tracing::warn!(error = %err, "report callback failed");
    }
}

/// Running plan. Dropping it aborts every group.
pub struct PlanHandle {
    controller: CancellationController,
    schedulers: Vec<ThreadGroupScheduler>,
    activity: Arc<PlanActivity>,
    metrics: Arc<MetricsAggregator>,
    trend: Arc<Mutex<TrendSeries>>,
    started: Instant,
    options: RunOptions,
    finished: CancellationToken,
    background: Vec<JoinHandle<()>>,
}

impl PlanHandle {
    /// Hard stop: no new iterations and in-flight calls are cancelled.
    pub fn stop(&self) {
        tracing::info!("plan stop requested");
        self.controller.stop();
    }

    /// Soft stop: no new iterations; current ones run to completion.
    pub fn request_stop(&self) {
        tracing::info!("plan soft stop requested");
        self.controller.request_stop();
    }

    /// Hard stop of one thread group. The plan and its other groups keep running.
    ///
    /// Returns `false` if no running group has that name.
    pub fn stop_group(&self, name: &str) -> bool {
        match self.group(name) {
            Some(scheduler) => {
                scheduler.stop();
                true
            }
            None => false,
        }
    }

    pub fn group(&self, name: &str) -> Option<&ThreadGroupScheduler> {
        self.schedulers.iter().find(|s| s.name() == name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut ThreadGroupScheduler> {
        self.schedulers.iter_mut().find(|s| s.name() == name)
    }

    pub fn controller(&self) -> &CancellationController {
        &self.controller
    }

    pub fn is_stopped(&self) -> bool {
        !self.controller.is_running()
    }

    pub fn total_target_threads(&self) -> u64 {
        self.activity.total_target()
    }

    pub fn active_threads(&self) -> u64 {
        self.activity.active()
    }

    pub fn peak_active_threads(&self) -> u64 {
        self.activity.peak()
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_finished(&self) -> bool {
        self.schedulers.iter().all(ThreadGroupScheduler::is_finished)
    }

    /// Wait for every group to finish. Returns `false` if `timeout` elapsed first.
    pub async fn await_completion(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        for scheduler in &mut self.schedulers {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            if !scheduler.await_completion(remaining).await {
                tracing::debug!(group = scheduler.name(), "thread group still running");
                return false;
            }
        }
        true
    }

    /// Wait for the plan to run to its natural end.
    pub async fn wait(&mut self) {
        for scheduler in &mut self.schedulers {
            scheduler.await_completion(Duration::MAX).await;
        }
    }

    /// Bounded wait after a stop. On timeout in-flight calls are force-cancelled and a short
    /// grace wait follows; if groups are still running after that, the plan is reported stuck.
    pub async fn drain(&mut self) -> Result<()> {
        if self.await_completion(self.options.stop_timeout).await {
            return Ok(());
        }

        tracing::warn!(
            timeout = ?self.options.stop_timeout,
            "plan did not stop in time; cancelling in-flight requests"
        );
        self.controller.cancel_in_flight();

        if self.await_completion(self.options.force_cancel_grace).await {
            return Ok(());
        }

        Err(Error::StopTimeout(
            self.options
                .stop_timeout
                .saturating_add(self.options.force_cancel_grace),
        ))
    }

    pub async fn stop_and_wait(&mut self) -> Result<()> {
        self.stop();
        self.drain().await
    }

    /// Tear down background sampling and build the end-of-run summary.
    ///
    /// Groups that are still running at this point are aborted.
    pub async fn finish(mut self) -> PlanSummary {
        for scheduler in &mut self.schedulers {
            if !scheduler.is_finished() {
                tracing::warn!(group = scheduler.name(), "aborting thread group");
                scheduler.abort();
            }
        }

        self.finished.cancel();
        for task in self.background.drain(..) {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "background task failed");
            }
        }

        let elapsed = self.started.elapsed();
        let snapshot = self.metrics.snapshot();
        let trend = self.trend.lock().points();

        let summary = PlanSummary::build(
            &snapshot,
            elapsed,
            self.is_stopped(),
            self.activity.total_target(),
            self.activity.peak(),
            trend,
        );
        tracing::info!(
            requests = summary.totals.requests,
            failures = summary.totals.failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "plan finished"
        );
        summary
    }
}

impl Drop for PlanHandle {
    fn drop(&mut self) {
        self.finished.cancel();
    }
}
