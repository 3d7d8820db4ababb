pub mod metrics;
pub mod layer;
pub mod tracing;

pub use metrics::{LiveMetrics, MetricsSnapshot};
pub use layer::ObservabilityLayer;

#[cfg(feature = "tracing-basic")]
pub use self::tracing::init_tracing;
