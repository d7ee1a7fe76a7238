//! Runtime support shared by producers and consumers: metrics, health and
//! listener fan-out.

pub(crate) mod listeners;
pub mod metrics;

pub mod prelude {
    pub use super::metrics::{
        ConsumerMetrics, HealthState, HealthStatus, MetricsCollector, ProducerMetrics,
    };
}
