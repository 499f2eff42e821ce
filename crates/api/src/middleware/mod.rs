// API Middleware
//
// Request instrumentation for the API layer.

pub mod metrics;

pub use metrics::{http_metrics_middleware, MetricsState};
