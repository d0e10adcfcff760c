#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use volley_core::{
    EngineContext, HttpError, HttpExecutor, HttpRequest, HttpResponse, LoopLimit, RequestChain,
    RequestTemplate, ThreadGroupConfig, ThreadGroupPlan,
};

/// In-memory target. Every call takes `latency`; URLs containing `/block` never answer on their
/// own. With `honor_cancel` a call returns `Cancelled` as soon as the token fires.
pub struct FakeHttp {
    latency: Duration,
    honor_cancel: bool,
    calls: AtomicU64,
}

impl FakeHttp {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            honor_cancel: true,
            calls: AtomicU64::new(0),
        })
    }

    pub fn ignoring_cancel(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            honor_cancel: false,
            calls: AtomicU64::new(0),
        })
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    async fn answer(&self, request: &HttpRequest) {
        if request.url.contains("/block") {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.latency).await;
    }
}

#[async_trait]
impl HttpExecutor for FakeHttp {
    async fn execute(
        &self,
        request: HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if self.honor_cancel {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(HttpError::Cancelled),
                _ = self.answer(&request) => {}
            }
        } else {
            self.answer(&request).await;
        }

        Ok(HttpResponse {
            status: 200,
            body: Bytes::from_static(b"ok"),
            headers: Vec::new(),
        })
    }
}

pub fn ctx(http: Arc<FakeHttp>) -> EngineContext {
    EngineContext::new(http)
}

pub fn chain(name: &str) -> RequestChain {
    RequestChain::new(name, RequestTemplate::get(format!("http://fake/{name}")))
}

pub fn group(name: &str, config: ThreadGroupConfig) -> ThreadGroupPlan {
    ThreadGroupPlan::new(name, config).with_chain(chain(name))
}

pub fn fixed_loops(threads: u64, loops: u64) -> ThreadGroupConfig {
    ThreadGroupConfig::Fixed {
        threads,
        limit: LoopLimit::Loops(loops),
    }
}

pub fn fixed_for(threads: u64, duration: Duration) -> ThreadGroupConfig {
    ThreadGroupConfig::Fixed {
        threads,
        limit: LoopLimit::Duration(duration),
    }
}

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

pub fn ms(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
