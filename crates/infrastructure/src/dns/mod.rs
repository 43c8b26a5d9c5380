pub mod events;
pub mod forward;
pub mod forwarding;
pub mod server;
pub mod transport;

pub use events::{ForwardMetrics, QueryTapEmitter, TapKind, TapMessage};
pub use forward::{build_forwarder, Forwarder, ForwarderOptions, Proxy, ProxyOptions, UpstreamTarget};
pub use server::{DnsServerHandler, RefuseHandler};
pub use transport::{ConnectionPool, DnsConnection, PoolStats, Protocol};
