use super::tls::TlsSettings;
use super::{tcp, tls, udp, Protocol};
use crate::dns::forwarding::response_parser::{ResponseParser, DNS_HEADER_LEN};
use ferrous_forward_domain::DomainError;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant;
use tokio_rustls::client::TlsStream;
use tracing::debug;

enum Stream {
    Udp(UdpSocket),
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// An open channel to one upstream over one protocol.
pub struct DnsConnection {
    stream: Stream,
    protocol: Protocol,
    server: SocketAddr,
}

impl DnsConnection {
    pub async fn connect(
        server: SocketAddr,
        protocol: Protocol,
        tls: Option<&TlsSettings>,
        dial_timeout: Duration,
    ) -> Result<Self, DomainError> {
        let stream = match protocol {
            Protocol::Udp => Stream::Udp(udp::connect(server).await?),
            Protocol::Tcp => Stream::Tcp(tcp::connect(server, dial_timeout).await?),
            Protocol::Tls => {
                let settings = tls.ok_or_else(|| {
                    DomainError::TlsError(format!("No TLS settings for upstream {}", server))
                })?;
                Stream::Tls(Box::new(tls::connect(server, settings, dial_timeout).await?))
            }
        };

        Ok(Self {
            stream,
            protocol,
            server,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    pub async fn send(&mut self, message: &[u8]) -> Result<(), DomainError> {
        let server = self.server;
        match &mut self.stream {
            Stream::Udp(socket) => udp::send(socket, server, message).await,
            Stream::Tcp(stream) => tcp::send_with_length_prefix(stream, server, message).await,
            Stream::Tls(stream) => {
                tcp::send_with_length_prefix(stream.as_mut(), server, message).await
            }
        }
    }

    pub async fn recv(&mut self) -> Result<Vec<u8>, DomainError> {
        let server = self.server;
        match &mut self.stream {
            Stream::Udp(socket) => udp::recv(socket, server).await,
            Stream::Tcp(stream) => tcp::read_with_length_prefix(stream, server).await,
            Stream::Tls(stream) => tcp::read_with_length_prefix(stream.as_mut(), server).await,
        }
    }

    /// Send `query` and wait for the reply carrying the same message ID.
    ///
    /// Replies with another ID (late answers to earlier queries on a reused
    /// connection) are discarded. `read_timeout` bounds the whole wait, not
    /// each individual read.
    pub async fn exchange(
        &mut self,
        query: &[u8],
        write_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Vec<u8>, DomainError> {
        let query_id = ResponseParser::id(query)
            .ok_or_else(|| DomainError::InvalidDnsQuery("Query shorter than its ID".to_string()))?;

        let server = self.server;
        let timed_out = || DomainError::TransportTimeout {
            server: server.to_string(),
        };

        tokio::time::timeout(write_timeout, self.send(query))
            .await
            .map_err(|_| timed_out())??;

        let deadline = Instant::now() + read_timeout;
        loop {
            let reply = tokio::time::timeout_at(deadline, self.recv())
                .await
                .map_err(|_| timed_out())??;

            if reply.len() < DNS_HEADER_LEN {
                return Err(DomainError::InvalidDnsResponse(format!(
                    "Reply from {} is only {} bytes",
                    self.server,
                    reply.len()
                )));
            }

            if ResponseParser::id(&reply) == Some(query_id) {
                return Ok(reply);
            }

            debug!(
                server = %self.server,
                protocol = self.protocol.name(),
                expected = query_id,
                got = ?ResponseParser::id(&reply),
                "Discarding reply with mismatched ID"
            );
        }
    }
}

impl std::fmt::Debug for DnsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsConnection")
            .field("protocol", &self.protocol)
            .field("server", &self.server)
            .finish()
    }
}
