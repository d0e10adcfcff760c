use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Outcome of one completed (not cancelled) request step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestResult {
    pub end: Instant,
    pub success: bool,
    pub latency_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub latencies: Vec<i64>,
    pub success_count: u64,
    pub fail_count: u64,
}

impl EndpointStats {
    fn record(&mut self, result: &RequestResult) {
        self.latencies.push(result.latency_ms);
        if result.success {
            self.success_count = self.success_count.saturating_add(1);
        } else {
            self.fail_count = self.fail_count.saturating_add(1);
        }
    }

    pub fn total(&self) -> u64 {
        self.success_count.saturating_add(self.fail_count)
    }
}

/// Independent copy of the aggregator state.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Completed requests, ordered by completion time.
    pub results: Vec<RequestResult>,
    pub endpoints: BTreeMap<Arc<str>, EndpointStats>,
}

impl MetricsSnapshot {
    pub fn total_requests(&self) -> u64 {
        self.results.len() as u64
    }

    pub fn total_failures(&self) -> u64 {
        self.results.iter().filter(|r| !r.success).count() as u64
    }
}

const RESULT_SHARDS: usize = 16;

/// Shard of the calling runtime thread. Threads are assigned round-robin on first use.
fn writer_shard() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    thread_local! {
        static SHARD: usize = NEXT.fetch_add(1, Ordering::Relaxed) % RESULT_SHARDS;
    }
    SHARD.with(|s| *s)
}

/// Shared sink for request outcomes.
///
/// The result log is split into shards so concurrent writers on different threads never share
/// a lock. Readers take a full copy with [`snapshot`](Self::snapshot), one shard at a time, and
/// never hold a reference into live state.
#[derive(Debug)]
pub struct MetricsAggregator {
    results: Box<[Mutex<Vec<RequestResult>>]>,
    endpoints: DashMap<Arc<str>, EndpointStats, ahash::RandomState>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self {
            results: (0..RESULT_SHARDS).map(|_| Mutex::new(Vec::new())).collect(),
            endpoints: DashMap::default(),
        }
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_result(&self, endpoint: &Arc<str>, result: RequestResult) {
        self.record_in_shard(writer_shard(), endpoint, result);
    }

    fn record_in_shard(&self, shard: usize, endpoint: &Arc<str>, result: RequestResult) {
        if let Some(log) = self.results.get(shard % self.results.len()) {
            log.lock().push(result);
        }

        // Avoid cloning the key on the hot path once the endpoint exists.
        if let Some(mut stats) = self.endpoints.get_mut(endpoint.as_ref()) {
            stats.record(&result);
            return;
        }
        self.endpoints
            .entry(endpoint.clone())
            .or_default()
            .record(&result);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut results = Vec::with_capacity(self.len());
        for shard in self.results.iter() {
            results.extend_from_slice(&shard.lock());
        }
        // Each shard is already close to completion order, so this is mostly a run merge.
        results.sort_by_key(|r| r.end);

        let endpoints = self
            .endpoints
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        MetricsSnapshot { results, endpoints }
    }

    pub fn reset(&self) {
        for shard in self.results.iter() {
            shard.lock().clear();
        }
        self.endpoints.clear();
    }

    pub fn len(&self) -> usize {
        self.results.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
