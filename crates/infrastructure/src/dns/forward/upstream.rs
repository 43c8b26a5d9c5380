use crate::dns::events::ForwardMetrics;
use crate::dns::transport::TlsSettings;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

/// One upstream address plus its count of consecutive failed health checks.
///
/// The counter is shared between the query path, which only reads it, and
/// the health checker, which is the only writer.
#[derive(Debug)]
pub struct UpstreamTarget {
    addr: SocketAddr,
    tls: Option<TlsSettings>,
    fails: AtomicU32,
    metrics: ForwardMetrics,
}

impl UpstreamTarget {
    pub fn new(addr: SocketAddr, tls: Option<TlsSettings>, metrics: ForwardMetrics) -> Self {
        Self {
            addr,
            tls,
            fails: AtomicU32::new(0),
            metrics,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn tls(&self) -> Option<&TlsSettings> {
        self.tls.as_ref()
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub fn fails(&self) -> u32 {
        self.fails.load(Ordering::Relaxed)
    }

    /// Down once failures exceed `max_fails`. A `max_fails` of zero disables the check.
    pub fn down(&self, max_fails: u32) -> bool {
        if max_fails == 0 {
            return false;
        }
        self.fails() > max_fails
    }

    pub fn record_success(&self) {
        self.fails.store(0, Ordering::Relaxed);
    }

    /// Returns the failure count after this failure.
    pub fn record_failure(&self) -> u32 {
        self.metrics.record_healthcheck_failure(self.addr);
        self.fails
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> UpstreamTarget {
        UpstreamTarget::new(
            "192.0.2.53:53".parse().unwrap(),
            None,
            ForwardMetrics::new(),
        )
    }

    #[test]
    fn test_down_after_exceeding_max_fails() {
        let target = target();
        assert!(!target.down(2));

        target.record_failure();
        target.record_failure();
        assert!(!target.down(2));

        assert_eq!(target.record_failure(), 3);
        assert!(target.down(2));
    }

    #[test]
    fn test_zero_max_fails_never_down() {
        let target = target();
        for _ in 0..10 {
            target.record_failure();
        }
        assert!(!target.down(0));
    }

    #[test]
    fn test_success_resets() {
        let target = target();
        for _ in 0..5 {
            target.record_failure();
        }
        target.record_success();
        assert_eq!(target.fails(), 0);
        assert!(!target.down(1));
    }

    #[test]
    fn test_failures_are_counted_in_metrics() {
        let metrics = ForwardMetrics::new();
        let target = UpstreamTarget::new("192.0.2.53:53".parse().unwrap(), None, metrics.clone());
        target.record_failure();
        target.record_failure();
        assert_eq!(metrics.healthcheck_failures(target.addr()), 2);
    }
}
