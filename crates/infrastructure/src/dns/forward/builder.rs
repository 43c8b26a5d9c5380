use super::forwarder::{Forwarder, ForwarderOptions};
use super::proxy::{Proxy, ProxyOptions};
use super::upstream::UpstreamTarget;
use crate::dns::events::{ForwardMetrics, QueryTapEmitter};
use crate::dns::transport::resolver::resolve_first;
use crate::dns::transport::TlsSettings;
use ferrous_forward_application::ports::DnsHandler;
use ferrous_forward_domain::{DomainError, ForwardRule, UpstreamEndpoint};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the forwarder for one `[[forward]]` rule; declined queries go to `next`.
pub async fn build_forwarder(
    rule: &ForwardRule,
    metrics: ForwardMetrics,
    tap: QueryTapEmitter,
    next: Option<Arc<dyn DnsHandler>>,
) -> Result<Forwarder, DomainError> {
    rule.validate()
        .map_err(|e| DomainError::ConfigError(e.to_string()))?;

    let endpoints = rule
        .endpoints()
        .map_err(|e| DomainError::ConfigError(e.to_string()))?;

    let tls_config = if endpoints.iter().any(UpstreamEndpoint::is_tls) {
        Some(TlsSettings::client_config(rule.tls.as_ref())?)
    } else {
        None
    };

    let proxy_options = ProxyOptions {
        expire: rule.expire(),
        dial_timeout: rule.dial_timeout(),
        health_check_interval: rule.health_check_interval(),
        force_tcp: rule.force_tcp,
    };

    let mut proxies = Vec::with_capacity(endpoints.len());
    for endpoint in &endpoints {
        let addr = resolve_endpoint(endpoint).await?;

        let tls = match &tls_config {
            Some(config) if endpoint.is_tls() => {
                let server_name = rule
                    .tls_servername
                    .clone()
                    .or_else(|| endpoint.hostname().map(str::to_string))
                    .unwrap_or_else(|| addr.ip().to_string());
                Some(TlsSettings::new(Arc::clone(config), &server_name)?)
            }
            _ => None,
        };

        proxies.push(Proxy::new(
            UpstreamTarget::new(addr, tls, metrics.clone()),
            &proxy_options,
        ));
    }

    info!(
        zone = %rule.from_zone(),
        upstreams = proxies.len(),
        max_fails = rule.max_fails,
        force_tcp = rule.force_tcp,
        "Forward rule configured"
    );

    let options = ForwarderOptions {
        max_fails: rule.max_fails,
        force_tcp: rule.force_tcp,
        read_timeout: rule.read_timeout(),
        ..ForwarderOptions::default()
    };

    let mut forwarder = Forwarder::new(rule.from_zone(), proxies, options)
        .with_ignored(rule.ignored_zones())
        .with_metrics(metrics)
        .with_tap(tap);
    if let Some(next) = next {
        forwarder = forwarder.with_next(next);
    }
    Ok(forwarder)
}

/// Host names are resolved once, at build time; the first address wins.
async fn resolve_endpoint(endpoint: &UpstreamEndpoint) -> Result<SocketAddr, DomainError> {
    if let Some(addr) = endpoint.addr.socket_addr() {
        return Ok(addr);
    }

    let (hostname, port) = endpoint.addr.unresolved_parts().ok_or_else(|| {
        DomainError::ConfigError(format!("Upstream '{}' has no address", endpoint))
    })?;

    let addr = resolve_first(hostname, port, RESOLVE_TIMEOUT).await?;
    info!(upstream = %endpoint, resolved = %addr, "Resolved upstream host name");
    Ok(addr)
}
