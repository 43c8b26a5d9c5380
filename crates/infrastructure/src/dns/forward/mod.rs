pub mod builder;
pub mod forwarder;
pub mod health_check;
pub mod probe;
pub mod proxy;
pub mod upstream;

pub use builder::build_forwarder;
pub use forwarder::{Forwarder, ForwarderOptions};
pub use health_check::HealthCheckClient;
pub use probe::{CheckFn, CheckFuture, Probe};
pub use proxy::{Proxy, ProxyOptions};
pub use upstream::UpstreamTarget;
