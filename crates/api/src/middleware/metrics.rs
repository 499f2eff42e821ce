//! HTTP metrics middleware for tracking request counts and latencies.
//!
//! This middleware records low-cardinality metrics for every HTTP request:
//! - `ecommerce_analytics.http.requests` - Count of HTTP requests by method, endpoint, status
//! - `ecommerce_analytics.http.duration` - Histogram of request durations by method, endpoint
//!
//! Endpoints are labelled with the matched route template rather than the raw path;
//! requests that match no route share a single `unmatched` label.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use services::metrics::{
    consts::{
        get_environment, METRIC_HTTP_DURATION, METRIC_HTTP_REQUESTS, TAG_ENDPOINT, TAG_ENVIRONMENT,
        TAG_METHOD, TAG_STATUS_CODE,
    },
    tag, MetricsServiceTrait,
};
use std::sync::Arc;
use std::time::Instant;

const UNMATCHED_ENDPOINT: &str = "unmatched";

/// State for the metrics middleware
#[derive(Clone)]
pub struct MetricsState {
    pub metrics_service: Arc<dyn MetricsServiceTrait>,
}

/// Middleware that records HTTP request metrics
pub async fn http_metrics_middleware(
    State(state): State<MetricsState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = endpoint_label(req.extensions().get::<MatchedPath>());

    let response = next.run(req).await;
    let duration = start.elapsed();
    let status = response.status().as_u16();

    let tags = [
        tag(TAG_METHOD, &method),
        tag(TAG_ENDPOINT, &endpoint),
        tag(TAG_STATUS_CODE, status),
        tag(TAG_ENVIRONMENT, get_environment()),
    ];
    let tags_str: Vec<&str> = tags.iter().map(|s| s.as_str()).collect();

    state
        .metrics_service
        .record_latency(METRIC_HTTP_DURATION, duration, &tags_str);
    state
        .metrics_service
        .record_count(METRIC_HTTP_REQUESTS, 1, &tags_str);

    response
}

fn endpoint_label(matched: Option<&MatchedPath>) -> String {
    matched
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string())
}
