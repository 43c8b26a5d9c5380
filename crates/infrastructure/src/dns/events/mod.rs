pub mod metrics;
pub mod tap;

pub use metrics::ForwardMetrics;
pub use tap::{QueryTapEmitter, TapKind, TapMessage};
