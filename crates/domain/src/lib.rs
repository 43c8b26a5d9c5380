//! Ferrous Forward Domain Layer
pub mod config;
pub mod dns_request;
pub mod errors;
pub mod upstream;
pub mod zone;

pub use config::{
    CliOverrides, Config, ConfigError, ForwardRule, LoggingConfig, ServerConfig, TlsFiles,
};
pub use dns_request::{ClientTransport, DnsRequest, DnsResponse};
pub use errors::DomainError;
pub use upstream::{UpstreamAddr, UpstreamEndpoint, UpstreamScheme};
pub use zone::ZoneName;
