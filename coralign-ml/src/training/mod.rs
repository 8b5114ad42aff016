//! Training-loop bookkeeping.

pub mod metrics;

pub use metrics::{MetricSummary, StepMetrics};
