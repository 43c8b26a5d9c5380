/// Status of an upstream DNS server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct UpstreamHealth {
    pub server: String,
    pub status: UpstreamStatus,
    pub consecutive_failures: u32,
}

/// Port for querying upstream DNS server health status.
pub trait UpstreamHealthPort: Send + Sync {
    fn get_all_upstream_status(&self) -> Vec<UpstreamHealth>;
}
