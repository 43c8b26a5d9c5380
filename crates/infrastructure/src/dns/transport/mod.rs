pub mod connection;
pub mod pool;
pub mod resolver;
pub mod tcp;
pub mod tls;
pub mod udp;

use std::fmt;

pub use connection::DnsConnection;
pub use pool::{ConnectionPool, PoolStats};
pub use tls::TlsSettings;

/// Wire transport used to talk to an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
    Tls,
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
            Protocol::Tls => "TLS",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
