use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_HELLO: &str = "/hello";
pub const PATH_ECHO: &str = "/echo";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_QP: &str = "/qp";
pub const PATH_JSON: &str = "/json";
pub const PATH_STATUS: &str = "/status/{code}";

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    saw_test_header: Arc<AtomicU64>,
    saw_ping_body: Arc<AtomicU64>,
    query_users: Arc<Mutex<Vec<String>>>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_saw_test_header(&self) {
        self.saw_test_header.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_saw_ping_body(&self) {
        self.saw_ping_body.fetch_add(1, Ordering::Relaxed);
    }

    fn push_query_user(&self, user: String) {
        self.query_users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(user);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn saw_test_header(&self) -> u64 {
        self.saw_test_header.load(Ordering::Relaxed)
    }

    pub fn saw_ping_body(&self) -> u64 {
        self.saw_ping_body.load(Ordering::Relaxed)
    }

    /// `user` query values observed on `/qp`, in arrival order.
    pub fn query_users(&self) -> Vec<String> {
        self.query_users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub hello: String,
    pub echo: String,
    pub slow: String,
    pub qp: String,
    pub json: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            hello: format!("{base_url}{PATH_HELLO}"),
            echo: format!("{base_url}{PATH_ECHO}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            qp: format!("{base_url}{PATH_QP}"),
            json: format!("{base_url}{PATH_JSON}"),
            base_url,
        }
    }

    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }

    /// Every route as `(name, url)`, for printing. `status` is shown with a sample code.
    pub fn endpoints(&self) -> Vec<(&'static str, String)> {
        vec![
            ("hello", self.hello.clone()),
            ("echo", self.echo.clone()),
            ("slow", format!("{}?ms=50", self.slow)),
            ("qp", format!("{}?user=<name>", self.qp)),
            ("json", self.json.clone()),
            ("status", self.status(418)),
        ]
    }
}

#[derive(Debug, Serialize)]
struct JsonUser {
    id: i64,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct JsonItem {
    id: i64,
}

#[derive(Debug, Serialize)]
struct JsonDocument {
    status: &'static str,
    user: JsonUser,
    items: Vec<JsonItem>,
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

async fn handle_hello(State(stats): State<TestServerStats>) -> &'static str {
    stats.inc_requests_total();
    "Hello World!"
}

async fn handle_slow(
    State(stats): State<TestServerStats>,
    Query(query): Query<HashMap<String, String>>,
) -> &'static str {
    stats.inc_requests_total();
    let ms = query
        .get("ms")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(50);
    sleep(Duration::from_millis(ms)).await;
    "slow"
}

async fn handle_echo(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Bytes) {
    stats.inc_requests_total();

    if headers.get("x-test").and_then(|v| v.to_str().ok()) == Some("1") {
        stats.inc_saw_test_header();
    }
    if body.as_ref() == b"ping" {
        stats.inc_saw_ping_body();
    }

    (StatusCode::OK, body)
}

async fn handle_qp(
    State(stats): State<TestServerStats>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    stats.inc_requests_total();

    match query.get("user") {
        Some(user) => {
            stats.push_query_user(user.clone());
            StatusCode::OK
        }
        None => StatusCode::BAD_REQUEST,
    }
}

async fn handle_json(State(stats): State<TestServerStats>) -> (StatusCode, Bytes) {
    stats.inc_requests_total();

    let doc = JsonDocument {
        status: "ok",
        user: JsonUser {
            id: 42,
            name: "volley",
        },
        items: vec![JsonItem { id: 1 }, JsonItem { id: 2 }],
    };

    match serde_json::to_vec(&doc) {
        Ok(bytes) => (StatusCode::OK, Bytes::from(bytes)),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from_static(b"encode error"),
        ),
    }
}

async fn handle_status(
    State(stats): State<TestServerStats>,
    Path(code): Path<u16>,
) -> StatusCode {
    stats.inc_requests_total();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_HELLO, get(handle_hello))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_ECHO, post(handle_echo))
        .route(PATH_QP, get(handle_qp))
        .route(PATH_JSON, get(handle_json))
        .route(PATH_STATUS, get(handle_status))
        .with_state(stats)
}

impl TestServer {
    /// Serve on an ephemeral localhost port.
    pub async fn start() -> std::io::Result<Self> {
        Self::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await
    }

    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();

        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        let base_url = format!("http://{addr}");
        let urls = TestServerUrls::new(base_url.clone());

        Ok(Self {
            addr,
            base_url,
            urls,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn urls_follow_the_bound_address() -> std::io::Result<()> {
        let server = TestServer::start().await?;
        let base = format!("http://{}", server.addr());
        assert_eq!(server.base_url(), base);

        let endpoints = server.urls().endpoints();
        let names: Vec<&str> = endpoints.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, ["hello", "echo", "slow", "qp", "json", "status"]);
        assert!(endpoints.iter().all(|(_, url)| url.starts_with(&base)));
        assert_eq!(server.urls().status(503), format!("{base}/status/503"));

        server.shutdown().await;
        Ok(())
    }
}
