mod dns_handler;
mod upstream_health_port;

pub use dns_handler::DnsHandler;
pub use upstream_health_port::{UpstreamHealth, UpstreamHealthPort, UpstreamStatus};
