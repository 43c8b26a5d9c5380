use async_trait::async_trait;
use ferrous_forward_domain::{DnsRequest, DnsResponse, DomainError};

/// One link of the query handling chain.
///
/// A handler either answers the request or passes it on to the next link it was built
/// with; the last link of a chain must always answer.
#[async_trait]
pub trait DnsHandler: Send + Sync {
    async fn serve(&self, request: &DnsRequest) -> Result<DnsResponse, DomainError>;

    fn name(&self) -> &'static str;
}
