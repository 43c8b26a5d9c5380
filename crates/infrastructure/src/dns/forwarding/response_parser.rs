//! Header-level inspection of upstream replies.
//!
//! Replies are relayed untouched, so only the fixed 12-byte header is read
//! on the hot path. Full parsing is reserved for health-check replies.

use hickory_proto::op::Message;

pub const DNS_HEADER_LEN: usize = 12;

const QR_BIT: u8 = 0x80;
const TC_BIT: u8 = 0x02;

pub struct ResponseParser;

impl ResponseParser {
    pub fn id(wire: &[u8]) -> Option<u16> {
        if wire.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([wire[0], wire[1]]))
    }

    /// Header RCODE (the low four bits; extended RCODEs live in OPT and are ignored).
    pub fn rcode(wire: &[u8]) -> Option<u16> {
        if wire.len() < DNS_HEADER_LEN {
            return None;
        }
        Some(u16::from(wire[3] & 0x0F))
    }

    pub fn is_response(wire: &[u8]) -> bool {
        wire.len() >= DNS_HEADER_LEN && wire[2] & QR_BIT != 0
    }

    pub fn is_truncated(wire: &[u8]) -> bool {
        wire.len() >= DNS_HEADER_LEN && wire[2] & TC_BIT != 0
    }

    fn opcode(wire: &[u8]) -> u8 {
        (wire[2] >> 3) & 0x0F
    }

    /// Reply acceptable as proof of liveness: QR set, an assigned opcode,
    /// and a body that decodes.
    pub fn is_well_formed_reply(wire: &[u8]) -> bool {
        if !Self::is_response(wire) {
            return false;
        }
        // QUERY, IQUERY, STATUS, NOTIFY, UPDATE, DSO
        if !matches!(Self::opcode(wire), 0 | 1 | 2 | 4 | 5 | 6) {
            return false;
        }
        Message::from_vec(wire).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::forwarding::MessageBuilder;
    use hickory_proto::op::ResponseCode;

    #[test]
    fn test_header_fields() {
        let wire = [0x12, 0x34, 0x82, 0x83, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(ResponseParser::id(&wire), Some(0x1234));
        assert_eq!(ResponseParser::rcode(&wire), Some(3));
        assert!(ResponseParser::is_response(&wire));
        assert!(ResponseParser::is_truncated(&wire));
    }

    #[test]
    fn test_short_input() {
        assert_eq!(ResponseParser::id(&[0x01]), None);
        assert_eq!(ResponseParser::rcode(&[0x01, 0x02, 0x80]), None);
        assert!(!ResponseParser::is_response(&[0x01, 0x02, 0x80]));
    }

    #[test]
    fn test_well_formed_reply() {
        let (_, query) = MessageBuilder::build_health_check().unwrap();
        assert!(!ResponseParser::is_well_formed_reply(&query));

        let reply = MessageBuilder::build_error_response(&query, ResponseCode::Refused).unwrap();
        assert!(ResponseParser::is_well_formed_reply(&reply));
    }

    #[test]
    fn test_unassigned_opcode_rejected() {
        let (_, query) = MessageBuilder::build_health_check().unwrap();
        let mut reply =
            MessageBuilder::build_error_response(&query, ResponseCode::NoError).unwrap();
        reply[2] = QR_BIT | (15 << 3);
        assert!(!ResponseParser::is_well_formed_reply(&reply));
    }
}
