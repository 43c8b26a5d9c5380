use crate::dns::forwarding::{MessageBuilder, RequestParser, ResponseParser};
use async_trait::async_trait;
use ferrous_forward_application::ports::DnsHandler;
use ferrous_forward_domain::{ClientTransport, DnsRequest, DnsResponse, DomainError};
use hickory_proto::op::ResponseCode;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point for raw client packets: parses, runs the handler chain and
/// always produces an answer when the packet carried a usable ID.
pub struct DnsServerHandler {
    chain: Arc<dyn DnsHandler>,
}

impl DnsServerHandler {
    pub fn new(chain: Arc<dyn DnsHandler>) -> Self {
        Self { chain }
    }

    pub async fn handle(
        &self,
        wire: &[u8],
        client: SocketAddr,
        transport: ClientTransport,
    ) -> Option<Vec<u8>> {
        let request = match RequestParser::parse(wire, client, transport) {
            Ok(request) => request,
            Err(e) => {
                debug!(client = %client, error = %e, "Malformed query");
                return MessageBuilder::build_error_response(wire, ResponseCode::FormErr);
            }
        };

        debug!(
            client = %client,
            transport = %transport,
            name = %request.name,
            query_type = request.query_type,
            "DNS query received"
        );

        match self.chain.serve(&request).await {
            Ok(response) => Some(response.wire),
            Err(DomainError::NoHandler(name)) => {
                debug!(name = %name, "No handler for query");
                MessageBuilder::build_error_response(wire, ResponseCode::Refused)
            }
            Err(e) => {
                warn!(name = %request.name, error = %e, "Query failed");
                MessageBuilder::build_error_response(wire, ResponseCode::ServFail)
            }
        }
    }
}

/// Last link of the chain: answers REFUSED for anything no forward rule accepted.
#[derive(Debug, Default)]
pub struct RefuseHandler;

#[async_trait]
impl DnsHandler for RefuseHandler {
    async fn serve(&self, request: &DnsRequest) -> Result<DnsResponse, DomainError> {
        let wire = MessageBuilder::build_error_response(&request.wire, ResponseCode::Refused)
            .ok_or_else(|| DomainError::NoHandler(request.name.to_string()))?;
        let rcode = ResponseParser::rcode(&wire).unwrap_or(u16::from(ResponseCode::Refused));
        Ok(DnsResponse::new(wire, rcode, None))
    }

    fn name(&self) -> &'static str {
        "refuse"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{Message, MessageType, OpCode, Query};
    use hickory_proto::rr::{Name, RecordType};
    use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};

    struct FailingHandler;

    #[async_trait]
    impl DnsHandler for FailingHandler {
        async fn serve(&self, _request: &DnsRequest) -> Result<DnsResponse, DomainError> {
            Err(DomainError::TransportAllServersUnreachable)
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn query_wire(id: u16) -> Vec<u8> {
        let mut message = Message::new();
        message.set_id(id);
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.add_query(Query::query(
            Name::from_ascii("example.org.").unwrap(),
            RecordType::A,
        ));
        let mut buf = Vec::new();
        message.emit(&mut BinEncoder::new(&mut buf)).unwrap();
        buf
    }

    fn client() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_refuse_handler_answers_refused() {
        let handler = DnsServerHandler::new(Arc::new(RefuseHandler));
        let reply = handler
            .handle(&query_wire(9), client(), ClientTransport::Udp)
            .await
            .unwrap();

        assert_eq!(ResponseParser::id(&reply), Some(9));
        assert_eq!(ResponseParser::rcode(&reply), Some(5));
    }

    #[tokio::test]
    async fn test_chain_error_is_servfail() {
        let handler = DnsServerHandler::new(Arc::new(FailingHandler));
        let reply = handler
            .handle(&query_wire(10), client(), ClientTransport::Tcp)
            .await
            .unwrap();

        assert_eq!(ResponseParser::id(&reply), Some(10));
        assert_eq!(ResponseParser::rcode(&reply), Some(2));
    }

    #[tokio::test]
    async fn test_malformed_is_formerr() {
        let handler = DnsServerHandler::new(Arc::new(RefuseHandler));
        let reply = handler
            .handle(&[0xAB, 0xCD, 0x01], client(), ClientTransport::Udp)
            .await
            .unwrap();

        assert_eq!(ResponseParser::id(&reply), Some(0xABCD));
        assert_eq!(ResponseParser::rcode(&reply), Some(1));
    }
}
