use ferrous_forward_domain::DomainError;
use std::net::SocketAddr;
use std::time::Duration;

/// Look up `host` once and keep the first address the system resolver returns.
pub async fn resolve_first(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<SocketAddr, DomainError> {
    let mut addrs = tokio::time::timeout(timeout, tokio::net::lookup_host((host, port)))
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: format!("{}:{}", host, port),
        })?
        .map_err(|e| {
            DomainError::ConfigError(format!("Cannot resolve upstream '{}': {}", host, e))
        })?;

    addrs
        .next()
        .ok_or_else(|| DomainError::ConfigError(format!("Upstream '{}' did not resolve", host)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_localhost() {
        let addr = resolve_first("localhost", 53, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(addr.port(), 53);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_unknown_host_fails() {
        let result = resolve_first("does-not-exist.invalid", 53, Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
