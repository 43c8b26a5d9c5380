use super::ZoneName;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Transport the client used to reach us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientTransport {
    Udp,
    Tcp,
}

impl fmt::Display for ClientTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientTransport::Udp => f.write_str("udp"),
            ClientTransport::Tcp => f.write_str("tcp"),
        }
    }
}

/// An incoming query: the question name plus the untouched wire bytes that get forwarded.
#[derive(Debug, Clone)]
pub struct DnsRequest {
    pub id: u16,
    pub name: ZoneName,
    pub query_type: u16,
    pub wire: Arc<[u8]>,
    pub client: SocketAddr,
    pub transport: ClientTransport,
}

impl DnsRequest {
    pub fn new(
        id: u16,
        name: ZoneName,
        query_type: u16,
        wire: impl Into<Arc<[u8]>>,
        client: SocketAddr,
        transport: ClientTransport,
    ) -> Self {
        Self {
            id,
            name,
            query_type,
            wire: wire.into(),
            client,
            transport,
        }
    }

    pub fn len(&self) -> usize {
        self.wire.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wire.is_empty()
    }
}

/// Wire-format answer relayed back to the client.
#[derive(Debug, Clone)]
pub struct DnsResponse {
    pub wire: Vec<u8>,
    pub rcode: u16,
    pub upstream: Option<SocketAddr>,
}

impl DnsResponse {
    pub fn new(wire: Vec<u8>, rcode: u16, upstream: Option<SocketAddr>) -> Self {
        Self {
            wire,
            rcode,
            upstream,
        }
    }
}
