//! Observability Module
//!
//! - `metrics`: Prometheus metrics for store transactions, dials and update conflicts
//! - `events`: Structured event logging with consistent fields
//! - `tracing`: Subscriber setup (text or JSON console output)

pub mod events;
pub mod metrics;
pub mod tracing;

pub use metrics::{init_metrics, MetricsState};
pub use tracing::{init_tracing, TracingConfig};
