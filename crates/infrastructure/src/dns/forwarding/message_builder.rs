//! DNS Message Builder
//!
//! Constructs the few messages the forwarder originates itself: the
//! health-check probe sent to upstreams and error answers returned to
//! clients. Forwarded queries are relayed byte-for-byte and never rebuilt.

use super::response_parser::DNS_HEADER_LEN;
use ferrous_forward_domain::DomainError;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};

/// Builds DNS messages in wire format
pub struct MessageBuilder;

impl MessageBuilder {
    /// Build the upstream liveness probe: `. IN NS` with recursion disabled.
    ///
    /// Returns the random message ID together with the serialized bytes so the
    /// caller can match the reply.
    pub fn build_health_check() -> Result<(u16, Vec<u8>), DomainError> {
        let id = fastrand::u16(..);

        let mut message = Message::new();
        message.set_id(id);
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.set_recursion_desired(false);
        message.add_query(Query::query(Name::root(), RecordType::NS));

        let bytes = Self::serialize_message(&message)?;
        Ok((id, bytes))
    }

    /// Build an answer to `query_wire` carrying `rcode` and no records.
    ///
    /// When the query parses, its ID, opcode, RD flag and question are echoed.
    /// When it does not, a bare header is built from whatever header bytes are
    /// present. Returns `None` if not even the message ID can be recovered.
    pub fn build_error_response(query_wire: &[u8], rcode: ResponseCode) -> Option<Vec<u8>> {
        if let Ok(query) = Message::from_vec(query_wire) {
            let mut message = Message::new();
            message.set_id(query.id());
            message.set_message_type(MessageType::Response);
            message.set_op_code(query.op_code());
            message.set_recursion_desired(query.recursion_desired());
            message.set_recursion_available(true);
            message.set_response_code(rcode);
            message.add_queries(query.queries().iter().cloned());

            if let Ok(bytes) = Self::serialize_message(&message) {
                return Some(bytes);
            }
        }

        Self::build_bare_header(query_wire, rcode)
    }

    fn build_bare_header(query_wire: &[u8], rcode: ResponseCode) -> Option<Vec<u8>> {
        if query_wire.len() < 2 {
            return None;
        }

        let mut header = vec![0u8; DNS_HEADER_LEN];
        header[0] = query_wire[0];
        header[1] = query_wire[1];

        // QR=1, keep opcode and RD from the query when we have them
        let flags_hi = query_wire.get(2).copied().unwrap_or(0);
        header[2] = 0x80 | (flags_hi & 0x79);
        header[3] = 0x80 | (u16::from(rcode) as u8 & 0x0F);
        Some(header)
    }

    /// Serialize a hickory Message to wire format bytes
    fn serialize_message(message: &Message) -> Result<Vec<u8>, DomainError> {
        let mut buf = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut buf);
        message.emit(&mut encoder).map_err(|e| {
            DomainError::InvalidDnsQuery(format!("Failed to serialize DNS message: {}", e))
        })?;
        Ok(buf)
    }
}
