use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counters shared by every forwarder and upstream of a running server.
#[derive(Clone, Default)]
pub struct ForwardMetrics {
    requests: Arc<DashMap<SocketAddr, u64>>,

    responses: Arc<DashMap<(SocketAddr, u16), u64>>,

    response_time_us: Arc<DashMap<SocketAddr, u64>>,

    healthcheck_failures: Arc<DashMap<SocketAddr, u64>>,

    pool_hits: Arc<AtomicU64>,

    pool_misses: Arc<AtomicU64>,

    exhausted: Arc<AtomicU64>,
}

impl ForwardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// One attempt sent to `upstream`, whatever its outcome.
    pub fn record_request(&self, upstream: SocketAddr) {
        self.requests
            .entry(upstream)
            .and_modify(|c| *c += 1)
            .or_insert(1);
    }

    pub fn record_response(&self, upstream: SocketAddr, rcode: u16, elapsed: Duration) {
        self.responses
            .entry((upstream, rcode))
            .and_modify(|c| *c += 1)
            .or_insert(1);
        self.response_time_us
            .entry(upstream)
            .and_modify(|t| *t += elapsed.as_micros() as u64)
            .or_insert(elapsed.as_micros() as u64);
    }

    pub fn record_healthcheck_failure(&self, upstream: SocketAddr) {
        self.healthcheck_failures
            .entry(upstream)
            .and_modify(|c| *c += 1)
            .or_insert(1);
    }

    pub fn record_pool_lookup(&self, cached: bool) {
        if cached {
            self.pool_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pool_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A query for which every upstream failed.
    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self, upstream: SocketAddr) -> u64 {
        self.requests.get(&upstream).map(|c| *c).unwrap_or(0)
    }

    pub fn responses(&self, upstream: SocketAddr, rcode: u16) -> u64 {
        self.responses
            .get(&(upstream, rcode))
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn avg_response_time_us(&self, upstream: SocketAddr) -> Option<u64> {
        let answered: u64 = self
            .responses
            .iter()
            .filter(|e| e.key().0 == upstream)
            .map(|e| *e.value())
            .sum();
        if answered == 0 {
            return None;
        }
        let total = self.response_time_us.get(&upstream).map(|t| *t)?;
        Some(total / answered)
    }

    pub fn healthcheck_failures(&self, upstream: SocketAddr) -> u64 {
        self.healthcheck_failures
            .get(&upstream)
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn pool_hits(&self) -> u64 {
        self.pool_hits.load(Ordering::Relaxed)
    }

    pub fn pool_misses(&self) -> u64 {
        self.pool_misses.load(Ordering::Relaxed)
    }

    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ForwardMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardMetrics")
            .field("upstreams", &self.requests.len())
            .field("pool_hits", &self.pool_hits())
            .field("pool_misses", &self.pool_misses())
            .field("exhausted", &self.exhausted())
            .finish()
    }
}
