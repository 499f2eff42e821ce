pub mod analytics;
pub mod common;
pub mod metrics;

pub use analytics::AnalyticsServiceImpl;
pub use common::RepositoryError;
