// Report cache metrics
pub const METRIC_CACHE_HITS: &str = "ecommerce_analytics.cache.hits";
pub const METRIC_CACHE_MISSES: &str = "ecommerce_analytics.cache.misses";

// Report assembly metrics
pub const METRIC_ASSEMBLY_DURATION: &str = "ecommerce_analytics.report.assembly_duration";
pub const METRIC_ASSEMBLY_FAILURES: &str = "ecommerce_analytics.report.assembly_failures";

// HTTP metrics
pub const METRIC_HTTP_REQUESTS: &str = "ecommerce_analytics.http.requests";
pub const METRIC_HTTP_DURATION: &str = "ecommerce_analytics.http.duration";

// Low-cardinality tags only
pub const TAG_ENVIRONMENT: &str = "environment";
pub const TAG_ERROR_TYPE: &str = "error_type";
pub const TAG_STATUS_CODE: &str = "status_code";
pub const TAG_ENDPOINT: &str = "endpoint";
pub const TAG_METHOD: &str = "method";

// Error types for TAG_ERROR_TYPE
pub const ERROR_TYPE_STORE_UNAVAILABLE: &str = "store_unavailable";
pub const ERROR_TYPE_COMPUTATION: &str = "computation";

/// Get the current environment from the ENVIRONMENT env var, defaulting to "local"
pub fn get_environment() -> String {
    std::env::var("ENVIRONMENT").unwrap_or_else(|_| "local".to_string())
}
