pub mod builders;
pub mod mock_upstream;

pub use builders::{closed_port, query_wire, request, request_over_tcp, ForwarderBuilder};
pub use mock_upstream::{Behavior, MockUpstream};
