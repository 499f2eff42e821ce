use serde::{Deserialize, Serialize};
use services::analytics::models::Report;
use std::sync::Arc;
use utoipa::ToSchema;

pub const CACHED_DATA_MESSAGE: &str = "Cached data:";
pub const ANALYTICS_ERROR_MESSAGE: &str = "Error fetching dashboard analytics";

/// Cache hit envelope around the report
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CachedAnalyticsResponse {
    pub message: String,
    pub cache_analytics: Arc<Report>,
}

/// Body of `GET /api/dashboard/analytics`.
///
/// A freshly assembled report is returned as-is, while a cached one is
/// wrapped unless envelope normalization is enabled.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum DashboardAnalyticsResponse {
    Cached(CachedAnalyticsResponse),
    Fresh(Arc<Report>),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalyticsErrorResponse {
    pub message: String,
    pub error: String,
}

impl AnalyticsErrorResponse {
    pub fn new(error: impl std::fmt::Display) -> Self {
        Self {
            message: ANALYTICS_ERROR_MESSAGE.to_string(),
            error: error.to_string(),
        }
    }
}
