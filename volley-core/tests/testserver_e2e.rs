#![allow(clippy::unwrap_used)]

use std::io::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use volley_core::{
    Assertion, CompareOp, CsvDataSource, EngineContext, HttpClient, LoopLimit, PlanCallbacks,
    RequestChain, RequestTemplate, RunOptions, ThreadGroupConfig, ThreadGroupPlan, Variables,
    start_plan,
};
use volley_testserver::TestServer;

fn http_ctx() -> EngineContext {
    EngineContext::new(Arc::new(HttpClient::default()))
}

fn fixed(threads: u64, loops: u64) -> ThreadGroupConfig {
    ThreadGroupConfig::Fixed {
        threads,
        limit: LoopLimit::Loops(loops),
    }
}

#[tokio::test]
async fn hello_with_passing_and_failing_assertions() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|err| panic!("start test server: {err}"));
    let urls = server.urls().clone();

    let plan_def = ThreadGroupPlan::new("smoke", fixed(2, 3))
        .with_chain(
            RequestChain::new("hello", RequestTemplate::get(&urls.hello))
                .with_assertion(Assertion::response_code(CompareOp::Eq, 200))
                .with_assertion(Assertion::body_contains("Hello")),
        )
        .with_chain(
            RequestChain::new("teapot", RequestTemplate::get(urls.status(418)))
                .with_assertion(Assertion::response_code(CompareOp::Lt, 400)),
        );

    let mut plan = start_plan(
        vec![plan_def],
        http_ctx(),
        RunOptions::default(),
        PlanCallbacks::default(),
    );
    plan.wait().await;
    let summary = plan.finish().await;

    assert_eq!(server.stats().requests_total(), 12);
    assert_eq!(summary.totals.requests, 12);
    assert_eq!(summary.totals.failures, 6);
    assert!(summary.has_failures());

    let hello = summary.endpoints.iter().find(|e| e.name == "hello").unwrap();
    assert_eq!(hello.successes, 6);
    assert!(hello.latency.is_some());
    let teapot = summary.endpoints.iter().find(|e| e.name == "teapot").unwrap();
    assert_eq!(teapot.failures, 6);
    assert_eq!(teapot.error_percent, 100.0);

    server.shutdown().await;
}

#[tokio::test]
async fn csv_rows_drive_query_parameters() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|err| panic!("start test server: {err}"));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "user, tier").unwrap();
    writeln!(file, "a, gold").unwrap();
    writeln!(file, "b, silver").unwrap();
    writeln!(file, "c, bronze").unwrap();
    file.flush().unwrap();
    let data = CsvDataSource::from_path(file.path()).unwrap();

    let template = RequestTemplate::get(format!("{}?user={{{{user}}}}", server.urls().qp))
        .with_header("x-tier", "{{tier}}");
    let plan_def = ThreadGroupPlan::new("users", fixed(1, 3)).with_chain(
        RequestChain::new("qp", template)
            .with_assertion(Assertion::response_code(CompareOp::Eq, 200)),
    );

    let mut plan = start_plan(
        vec![plan_def],
        http_ctx().with_data(Arc::new(data)),
        RunOptions::default(),
        PlanCallbacks::default(),
    );
    plan.wait().await;
    let summary = plan.finish().await;

    assert_eq!(summary.totals.successes, 3);
    assert_eq!(server.stats().query_users(), vec!["a", "b", "c"]);

    server.shutdown().await;
}

#[tokio::test]
async fn json_path_assertions_against_live_document() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|err| panic!("start test server: {err}"));

    let variables: Variables = [("base", server.base_url())].into_iter().collect();
    let chain = RequestChain::new("json", RequestTemplate::get("{{base}}/json"))
        .with_assertion(Assertion::json_path("$.status", "ok").unwrap())
        .with_assertion(Assertion::json_path("$.user.id", "42").unwrap())
        .with_assertion(Assertion::json_path("$.items[1].id", "2").unwrap());

    let mut plan = start_plan(
        vec![ThreadGroupPlan::new("json", fixed(1, 2)).with_chain(chain)],
        http_ctx().with_variables(variables),
        RunOptions::default(),
        PlanCallbacks::default(),
    );
    plan.wait().await;
    let summary = plan.finish().await;

    assert_eq!(summary.totals.requests, 2);
    assert_eq!(summary.totals.failures, 0);

    server.shutdown().await;
}

#[tokio::test]
async fn stop_cancels_slow_requests_promptly() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|err| panic!("start test server: {err}"));
    let url = format!("{}?ms=5000", server.urls().slow);

    let plan_def = ThreadGroupPlan::new(
        "slow",
        ThreadGroupConfig::Fixed {
            threads: 4,
            limit: LoopLimit::Duration(Duration::from_secs(60)),
        },
    )
    .with_chain(RequestChain::new("slow", RequestTemplate::get(url)));

    let mut plan = start_plan(
        vec![plan_def],
        http_ctx(),
        RunOptions::default(),
        PlanCallbacks::default(),
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(plan.active_threads(), 4);

    let started = Instant::now();
    plan.stop_and_wait()
        .await
        .unwrap_or_else(|err| panic!("stop: {err}"));
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "stop took {:?}",
        started.elapsed()
    );

    let summary = plan.finish().await;
    assert!(summary.stopped);
    assert_eq!(summary.totals.requests, 0);

    server.shutdown().await;
}
