#![allow(clippy::unwrap_used)]

mod common;

use volley_core::{
    Error, PlanCallbacks, RequestChain, RequestTemplate, RunOptions, ThreadGroupPlan, start_plan,
};

use common::{FakeHttp, chain, ctx, fixed_for, fixed_loops, group, ms, secs};

fn fast_then_blocked() -> ThreadGroupPlan {
    ThreadGroupPlan::new("mixed", fixed_for(2, secs(60)))
        .with_chain(chain("fast"))
        .with_chain(RequestChain::new(
            "block",
            RequestTemplate::get("http://fake/block"),
        ))
}

#[tokio::test(start_paused = true)]
async fn hard_stop_discards_cancelled_calls() {
    let http = FakeHttp::new(ms(100));
    let mut plan = start_plan(
        vec![fast_then_blocked()],
        ctx(http.clone()),
        RunOptions::default(),
        PlanCallbacks::default(),
    );

    tokio::time::sleep(secs(1)).await;
    assert_eq!(plan.active_threads(), 2);
    assert_eq!(http.calls(), 4);

    plan.stop_and_wait().await.unwrap();
    assert!(plan.is_stopped());
    assert_eq!(plan.active_threads(), 0);

    let summary = plan.finish().await;
    assert!(summary.stopped);
    assert_eq!(summary.totals.requests, 2);
    assert_eq!(summary.totals.failures, 0);
    assert_eq!(summary.endpoints.len(), 1);
    assert_eq!(summary.endpoints[0].name, "fast");
}

#[tokio::test(start_paused = true)]
async fn soft_stop_lets_current_iteration_finish() {
    let http = FakeHttp::new(secs(1));
    let mut plan = start_plan(
        vec![group("slow", fixed_for(1, secs(60)))],
        ctx(http.clone()),
        RunOptions::default(),
        PlanCallbacks::default(),
    );

    // Second call is on the wire until 2s.
    tokio::time::sleep(ms(1_500)).await;
    plan.request_stop();
    assert!(plan.is_stopped());
    assert_eq!(plan.active_threads(), 1);

    plan.drain().await.unwrap();
    let summary = plan.finish().await;

    assert_eq!(http.calls(), 2);
    assert_eq!(summary.totals.requests, 2);
    assert_eq!(summary.totals.successes, 2);
    assert!(summary.elapsed >= secs(2));
}

#[tokio::test(start_paused = true)]
async fn soft_stop_skips_remaining_steps_of_the_chain() {
    let http = FakeHttp::new(ms(100));
    let plan_def = ThreadGroupPlan::new("steps", fixed_for(1, secs(60)))
        .with_chain(chain("first"))
        .with_chain(chain("second"));
    let mut plan = start_plan(
        vec![plan_def],
        ctx(http.clone()),
        RunOptions::default(),
        PlanCallbacks::default(),
    );

    tokio::time::sleep(ms(50)).await;
    plan.request_stop();
    plan.drain().await.unwrap();

    let summary = plan.finish().await;
    assert_eq!(summary.totals.requests, 1);
    assert_eq!(summary.endpoints[0].name, "first");
}

#[tokio::test(start_paused = true)]
async fn stuck_calls_force_cancel_then_time_out() {
    let http = FakeHttp::ignoring_cancel(ms(10));
    let options = RunOptions {
        stop_timeout: secs(1),
        force_cancel_grace: ms(500),
        ..RunOptions::default()
    };
    let mut plan = start_plan(
        vec![ThreadGroupPlan::new("stuck", fixed_for(1, secs(60))).with_chain(RequestChain::new(
            "block",
            RequestTemplate::get("http://fake/block"),
        ))],
        ctx(http),
        options,
        PlanCallbacks::default(),
    );

    tokio::time::sleep(ms(100)).await;
    let err = plan.stop_and_wait().await.unwrap_err();
    assert!(matches!(err, Error::StopTimeout(d) if d == ms(1_500)), "{err}");
    assert!(plan.controller().is_in_flight_cancelled());
    assert!(!plan.is_finished());

    let summary = plan.finish().await;
    assert!(summary.stopped);
    assert_eq!(summary.totals.requests, 0);
}

#[tokio::test(start_paused = true)]
async fn drain_escalates_soft_stop_to_force_cancel() {
    let http = FakeHttp::new(ms(10));
    let options = RunOptions {
        stop_timeout: secs(1),
        force_cancel_grace: ms(500),
        ..RunOptions::default()
    };
    let mut plan = start_plan(
        vec![ThreadGroupPlan::new("stuck", fixed_for(1, secs(60))).with_chain(RequestChain::new(
            "block",
            RequestTemplate::get("http://fake/block"),
        ))],
        ctx(http),
        options,
        PlanCallbacks::default(),
    );

    tokio::time::sleep(ms(100)).await;
    plan.request_stop();
    assert!(!plan.controller().is_in_flight_cancelled());

    plan.drain().await.unwrap();
    assert!(plan.controller().is_in_flight_cancelled());
    assert!(plan.is_finished());
    assert_eq!(plan.finish().await.totals.requests, 0);
}

#[tokio::test(start_paused = true)]
async fn stopping_one_group_leaves_its_sibling_running() {
    let http = FakeHttp::new(ms(100));
    let mut plan = start_plan(
        vec![fast_then_blocked(), group("steady", fixed_loops(1, 20))],
        ctx(http),
        RunOptions::default(),
        PlanCallbacks::default(),
    );

    tokio::time::sleep(ms(950)).await;
    assert_eq!(plan.group("mixed").unwrap().active_count(), 2);
    assert_eq!(plan.group("steady").unwrap().active_count(), 1);
    assert!(!plan.stop_group("missing"));

    assert!(plan.stop_group("mixed"));
    assert!(
        plan.group_mut("mixed")
            .unwrap()
            .await_completion(ms(100))
            .await
    );
    assert_eq!(plan.group("mixed").unwrap().active_count(), 0);
    assert!(!plan.is_stopped());
    assert_eq!(plan.active_threads(), 1);

    plan.wait().await;
    let summary = plan.finish().await;
    assert!(!summary.stopped);

    let count = |name: &str| {
        summary
            .endpoints
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.requests)
    };
    assert_eq!(count("fast"), Some(2));
    assert_eq!(count("block"), None);
    assert_eq!(count("steady"), Some(20));
    assert_eq!(summary.totals.failures, 0);
}

#[tokio::test(start_paused = true)]
async fn group_wait_times_out_while_calls_ignore_cancel() {
    let http = FakeHttp::ignoring_cancel(ms(10));
    let mut plan = start_plan(
        vec![ThreadGroupPlan::new("stuck", fixed_for(1, secs(60))).with_chain(RequestChain::new(
            "block",
            RequestTemplate::get("http://fake/block"),
        ))],
        ctx(http),
        RunOptions::default(),
        PlanCallbacks::default(),
    );

    tokio::time::sleep(ms(100)).await;
    assert!(plan.stop_group("stuck"));

    let stuck = plan.group_mut("stuck").unwrap();
    assert!(!stuck.await_completion(secs(1)).await);
    assert!(!stuck.is_finished());
    assert_eq!(stuck.active_count(), 1);

    let summary = plan.finish().await;
    assert_eq!(summary.totals.requests, 0);
}
