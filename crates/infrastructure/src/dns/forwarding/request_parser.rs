use ferrous_forward_domain::{ClientTransport, DnsRequest, DomainError, ZoneName};
use hickory_proto::op::{Message, MessageType};
use std::net::SocketAddr;

/// Turns client bytes into a [`DnsRequest`], keeping the original wire for relaying.
pub struct RequestParser;

impl RequestParser {
    pub fn parse(
        wire: &[u8],
        client: SocketAddr,
        transport: ClientTransport,
    ) -> Result<DnsRequest, DomainError> {
        let message = Message::from_vec(wire)
            .map_err(|e| DomainError::InvalidDnsQuery(format!("Failed to parse query: {}", e)))?;

        if message.message_type() != MessageType::Query {
            return Err(DomainError::InvalidDnsQuery(
                "Message is not a query".to_string(),
            ));
        }

        let question = message
            .queries()
            .first()
            .ok_or_else(|| DomainError::InvalidDnsQuery("Query has no question".to_string()))?;

        Ok(DnsRequest::new(
            message.id(),
            ZoneName::new(&question.name().to_ascii()),
            u16::from(question.query_type()),
            wire,
            client,
            transport,
        ))
    }
}
