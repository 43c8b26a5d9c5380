use super::health_check::HealthCheckClient;
use super::probe::{CheckFn, Probe};
use super::upstream::UpstreamTarget;
use crate::dns::transport::{ConnectionPool, DnsConnection, Protocol};
use ferrous_forward_domain::DomainError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub expire: Duration,
    pub dial_timeout: Duration,
    pub health_check_interval: Duration,
    pub force_tcp: bool,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            expire: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(4),
            health_check_interval: Duration::from_millis(500),
            force_tcp: false,
        }
    }
}

/// An upstream together with its connection pool and health probe.
pub struct Proxy {
    target: Arc<UpstreamTarget>,
    pool: Arc<ConnectionPool>,
    probe: Probe,
    force_tcp: bool,
}

impl Proxy {
    pub fn new(target: UpstreamTarget, options: &ProxyOptions) -> Self {
        let pool = ConnectionPool::new(
            target.addr(),
            target.tls().cloned(),
            options.expire,
            options.dial_timeout,
        );
        Self {
            target: Arc::new(target),
            pool: Arc::new(pool),
            probe: Probe::new(options.health_check_interval),
            force_tcp: options.force_tcp,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.target.addr()
    }

    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub async fn dial(&self, protocol: Protocol) -> Result<(DnsConnection, bool), DomainError> {
        self.pool.dial(protocol).await
    }

    pub async fn dial_fresh(&self, protocol: Protocol) -> Result<DnsConnection, DomainError> {
        self.pool.connect(protocol).await
    }

    pub fn yield_conn(&self, conn: DnsConnection) {
        self.pool.yield_conn(conn);
    }

    pub fn down(&self, max_fails: u32) -> bool {
        self.target.down(max_fails)
    }

    /// Kick an out-of-band health check; a no-op while one is already running.
    pub fn healthcheck(&self) -> bool {
        self.probe.do_check(self.check_fn())
    }

    fn check_fn(&self) -> CheckFn {
        let client = HealthCheckClient::for_target(&self.target, self.force_tcp);
        let target = Arc::clone(&self.target);
        Arc::new(move || {
            let client = client.clone();
            let target = Arc::clone(&target);
            Box::pin(async move { client.check(&target).await })
        })
    }

    pub fn start(&self) {
        debug!(upstream = %self.addr(), interval_ms = self.probe.interval().as_millis() as u64, "Starting upstream health probe");
        self.probe.start(self.check_fn());
        self.pool.start();
    }

    pub async fn close(&self) {
        self.probe.stop().await;
        self.pool.stop().await;
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("addr", &self.addr())
            .field("fails", &self.target.fails())
            .field("pool", &self.pool.stats())
            .finish()
    }
}
