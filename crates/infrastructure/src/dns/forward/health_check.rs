use super::upstream::UpstreamTarget;
use crate::dns::forwarding::{MessageBuilder, ResponseParser};
use crate::dns::transport::{DnsConnection, Protocol};
use ferrous_forward_domain::DomainError;
use std::time::Duration;
use tracing::{debug, warn};

pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Sends `. IN NS` probes to one upstream and records the outcome on it.
#[derive(Debug, Clone)]
pub struct HealthCheckClient {
    protocol: Protocol,
    timeout: Duration,
}

impl HealthCheckClient {
    pub fn new(protocol: Protocol, timeout: Duration) -> Self {
        Self { protocol, timeout }
    }

    /// Probe over the upstream's own transport: TLS when configured, else TCP if forced, else UDP.
    pub fn for_target(target: &UpstreamTarget, force_tcp: bool) -> Self {
        let protocol = if target.is_tls() {
            Protocol::Tls
        } else if force_tcp {
            Protocol::Tcp
        } else {
            Protocol::Udp
        };
        Self::new(protocol, HEALTH_CHECK_TIMEOUT)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub async fn check(&self, target: &UpstreamTarget) -> Result<(), DomainError> {
        match self.send_probe(target).await {
            Ok(()) => {
                target.record_success();
                Ok(())
            }
            Err(e) => {
                let fails = target.record_failure();
                if fails == 1 {
                    warn!(upstream = %target.addr(), protocol = self.protocol.name(), error = %e, "Upstream health check failed");
                } else {
                    debug!(upstream = %target.addr(), fails, error = %e, "Upstream still failing health checks");
                }
                Err(e)
            }
        }
    }

    async fn send_probe(&self, target: &UpstreamTarget) -> Result<(), DomainError> {
        let (_, query) = MessageBuilder::build_health_check()?;

        let mut conn =
            DnsConnection::connect(target.addr(), self.protocol, target.tls(), self.timeout)
                .await?;
        let reply = conn.exchange(&query, self.timeout, self.timeout).await?;

        if !ResponseParser::is_well_formed_reply(&reply) {
            return Err(DomainError::InvalidDnsResponse(format!(
                "Malformed health check reply from {}",
                target.addr()
            )));
        }
        Ok(())
    }
}
