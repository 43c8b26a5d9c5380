use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum DomainError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Invalid DNS query: {0}")]
    InvalidDnsQuery(String),

    #[error("Invalid DNS response: {0}")]
    InvalidDnsResponse(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Transport timeout talking to {server}")]
    TransportTimeout { server: String },

    #[error("Transport connection refused by {server}")]
    TransportConnectionRefused { server: String },

    #[error("Transport connection reset by {server}")]
    TransportConnectionReset { server: String },

    #[error("Transport error with {server}: {reason}")]
    TransportError { server: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No handler accepted the query for {0}")]
    NoHandler(String),

    #[error("All upstream servers are unreachable")]
    TransportAllServersUnreachable,
}

impl DomainError {
    /// Maps an I/O error raised while talking to `server` onto the transport variants.
    pub fn from_io(server: impl ToString, error: &std::io::Error) -> Self {
        use std::io::ErrorKind;

        let server = server.to_string();
        match error.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::TransportTimeout { server },
            ErrorKind::ConnectionRefused => Self::TransportConnectionRefused { server },
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                Self::TransportConnectionReset { server }
            }
            _ => Self::TransportError {
                server,
                reason: error.to_string(),
            },
        }
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout { .. }
                | Self::TransportConnectionRefused { .. }
                | Self::TransportConnectionReset { .. }
                | Self::TransportError { .. }
                | Self::TransportAllServersUnreachable
                | Self::TlsError(_)
                | Self::IoError(_)
        )
    }
}
