pub mod errors;
pub mod forward;
pub mod logging;
pub mod root;
pub mod server;

pub use errors::ConfigError;
pub use forward::{ForwardRule, TlsFiles};
pub use logging::LoggingConfig;
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
