//! Forward orchestration: zone matching, upstream ordering and failover.

use super::proxy::Proxy;
use crate::dns::events::{ForwardMetrics, QueryTapEmitter, TapKind};
use crate::dns::forwarding::ResponseParser;
use crate::dns::transport::{DnsConnection, Protocol};
use async_trait::async_trait;
use ferrous_forward_application::ports::{
    DnsHandler, UpstreamHealth, UpstreamHealthPort, UpstreamStatus,
};
use ferrous_forward_domain::{ClientTransport, DnsRequest, DnsResponse, DomainError, ZoneName};
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Queries larger than this go over TCP even when UDP would be chosen.
pub const MAX_UDP_QUERY_SIZE: usize = 512;

type Selection<'a> = SmallVec<[&'a Proxy; 16]>;

#[derive(Debug, Clone)]
pub struct ForwarderOptions {
    pub max_fails: u32,
    pub force_tcp: bool,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ForwarderOptions {
    fn default() -> Self {
        Self {
            max_fails: 2,
            force_tcp: false,
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
        }
    }
}

pub struct Forwarder {
    from: ZoneName,
    ignored: Vec<ZoneName>,
    proxies: Vec<Arc<Proxy>>,
    options: ForwarderOptions,
    metrics: ForwardMetrics,
    tap: QueryTapEmitter,
    next: Option<Arc<dyn DnsHandler>>,
}

impl Forwarder {
    pub fn new(from: ZoneName, proxies: Vec<Proxy>, options: ForwarderOptions) -> Self {
        Self {
            from,
            ignored: Vec::new(),
            proxies: proxies.into_iter().map(Arc::new).collect(),
            options,
            metrics: ForwardMetrics::new(),
            tap: QueryTapEmitter::new_disabled(),
            next: None,
        }
    }

    pub fn with_ignored(mut self, ignored: Vec<ZoneName>) -> Self {
        self.ignored = ignored;
        self
    }

    pub fn with_metrics(mut self, metrics: ForwardMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_tap(mut self, tap: QueryTapEmitter) -> Self {
        self.tap = tap;
        self
    }

    /// Handler that receives every query this forwarder declines.
    pub fn with_next(mut self, next: Arc<dyn DnsHandler>) -> Self {
        self.next = Some(next);
        self
    }

    pub fn from_zone(&self) -> &ZoneName {
        &self.from
    }

    pub fn proxies(&self) -> &[Arc<Proxy>] {
        &self.proxies
    }

    pub fn metrics(&self) -> &ForwardMetrics {
        &self.metrics
    }

    /// True when `name` is under the forwarded zone and not under an excepted one.
    pub fn matches(&self, name: &ZoneName) -> bool {
        self.from.contains(name) && !self.ignored.iter().any(|zone| zone.contains(name))
    }

    /// Order in which upstreams are tried for one query.
    ///
    /// Two upstreams are swapped half of the time; more than two are shuffled.
    pub fn select(&self) -> Selection<'_> {
        let mut order: Selection<'_> = self.proxies.iter().map(|p| p.as_ref()).collect();
        match order.len() {
            0 | 1 => {}
            2 => {
                if fastrand::bool() {
                    order.swap(0, 1);
                }
            }
            _ => fastrand::shuffle(&mut order),
        }
        order
    }

    /// TCP clients are never answered from UDP, so a truncated reply cannot reach them.
    fn protocol_for(&self, proxy: &Proxy, request: &DnsRequest) -> Protocol {
        if proxy.target().is_tls() {
            Protocol::Tls
        } else if self.options.force_tcp
            || request.transport == ClientTransport::Tcp
            || request.len() > MAX_UDP_QUERY_SIZE
        {
            Protocol::Tcp
        } else {
            Protocol::Udp
        }
    }

    /// Send `request` upstream, failing over through the selected order.
    pub async fn forward(&self, request: &DnsRequest) -> Result<DnsResponse, DomainError> {
        let candidates = self.select();
        let total = candidates.len();
        let mut fails_seen = 0;

        for candidate in candidates {
            let mut proxy = candidate;
            let mut forced = false;

            if proxy.down(self.options.max_fails) {
                fails_seen += 1;
                if fails_seen < total {
                    debug!(upstream = %proxy.addr(), "Skipping upstream marked down");
                    continue;
                }
                let Some(first) = self.proxies.first() else {
                    break;
                };
                warn!(
                    zone = %self.from,
                    upstream = %first.addr(),
                    "All upstreams are down, forcing the first one"
                );
                proxy = first.as_ref();
                forced = true;
            }

            let protocol = self.protocol_for(proxy, request);
            match self.attempt(proxy, protocol, request).await {
                Ok(reply) => {
                    let rcode = ResponseParser::rcode(&reply).unwrap_or(0);
                    return Ok(DnsResponse::new(reply, rcode, Some(proxy.addr())));
                }
                Err(e) => {
                    warn!(
                        upstream = %proxy.addr(),
                        protocol = protocol.name(),
                        forced,
                        error = %e,
                        "Upstream exchange failed"
                    );
                    proxy.healthcheck();
                }
            }
        }

        self.metrics.record_exhausted();
        Err(DomainError::TransportAllServersUnreachable)
    }

    #[instrument(
        name = "forward_attempt",
        skip_all,
        fields(upstream = %proxy.addr(), protocol = protocol.name(), qname = %request.name)
    )]
    async fn attempt(
        &self,
        proxy: &Proxy,
        protocol: Protocol,
        request: &DnsRequest,
    ) -> Result<Vec<u8>, DomainError> {
        let started = Instant::now();
        self.metrics.record_request(proxy.addr());

        let (conn, cached) = proxy.dial(protocol).await?;
        self.metrics.record_pool_lookup(cached);

        let reply = match self.exchange_on(proxy, conn, request).await {
            // a pooled connection may have been closed by the upstream while idle
            Err(e) if cached && !matches!(e, DomainError::TransportTimeout { .. }) => {
                debug!(error = %e, "Reused connection failed, retrying on a new one");
                let conn = proxy.dial_fresh(protocol).await?;
                self.exchange_on(proxy, conn, request).await?
            }
            result => result?,
        };

        let rcode = ResponseParser::rcode(&reply).unwrap_or(0);
        self.metrics
            .record_response(proxy.addr(), rcode, started.elapsed());
        if ResponseParser::is_truncated(&reply) {
            debug!("Relaying truncated reply");
        }
        Ok(reply)
    }

    async fn exchange_on(
        &self,
        proxy: &Proxy,
        mut conn: DnsConnection,
        request: &DnsRequest,
    ) -> Result<Vec<u8>, DomainError> {
        let protocol = conn.protocol();
        self.tap
            .emit(TapKind::ForwarderQuery, proxy.addr(), protocol, &request.wire);

        let reply = conn
            .exchange(
                &request.wire,
                self.options.write_timeout,
                self.options.read_timeout,
            )
            .await?;

        proxy.yield_conn(conn);
        self.tap
            .emit(TapKind::ForwarderResponse, proxy.addr(), protocol, &reply);
        Ok(reply)
    }

    pub fn start(&self) {
        for proxy in &self.proxies {
            proxy.start();
        }
    }

    pub async fn close(&self) {
        for proxy in &self.proxies {
            proxy.close().await;
        }
    }
}

#[async_trait]
impl DnsHandler for Forwarder {
    async fn serve(&self, request: &DnsRequest) -> Result<DnsResponse, DomainError> {
        if !self.matches(&request.name) {
            return match &self.next {
                Some(next) => next.serve(request).await,
                None => Err(DomainError::NoHandler(request.name.to_string())),
            };
        }
        self.forward(request).await
    }

    fn name(&self) -> &'static str {
        "forward"
    }
}

impl UpstreamHealthPort for Forwarder {
    fn get_all_upstream_status(&self) -> Vec<UpstreamHealth> {
        self.proxies
            .iter()
            .map(|proxy| UpstreamHealth {
                server: proxy.addr().to_string(),
                status: if proxy.down(self.options.max_fails) {
                    UpstreamStatus::Unhealthy
                } else {
                    UpstreamStatus::Healthy
                },
                consecutive_failures: proxy.target().fails(),
            })
            .collect()
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("from", &self.from)
            .field("ignored", &self.ignored)
            .field("proxies", &self.proxies)
            .field("options", &self.options)
            .finish()
    }
}
