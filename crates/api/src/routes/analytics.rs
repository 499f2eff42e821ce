use crate::models::{
    AnalyticsErrorResponse, CachedAnalyticsResponse, DashboardAnalyticsResponse,
    CACHED_DATA_MESSAGE,
};
use axum::{extract::State, http::StatusCode, response::Json as ResponseJson};
use services::analytics::{AnalyticsServiceTrait, ReportSource};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Clone)]
pub struct AnalyticsAppState {
    pub analytics_service: Arc<dyn AnalyticsServiceTrait>,
    /// Serve cache hits as a bare report instead of the `cacheAnalytics` envelope
    pub normalize_cached_envelope: bool,
}

/// Dashboard analytics
///
/// Returns the e-commerce dashboard report. The report is assembled on a cache
/// miss and then served from cache until its time-to-live expires; cache hits
/// are wrapped as `{"message": "Cached data:", "cacheAnalytics": ...}`.
#[utoipa::path(
    get,
    path = "/api/dashboard/analytics",
    tag = "Analytics",
    responses(
        (status = 200, description = "Dashboard report, fresh or cached", body = DashboardAnalyticsResponse),
        (status = 500, description = "Report could not be assembled", body = AnalyticsErrorResponse)
    )
)]
pub async fn get_dashboard_analytics(
    State(app_state): State<AnalyticsAppState>,
) -> Result<ResponseJson<DashboardAnalyticsResponse>, (StatusCode, ResponseJson<AnalyticsErrorResponse>)>
{
    let analytics = app_state
        .analytics_service
        .get_dashboard_analytics()
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to fetch dashboard analytics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ResponseJson(AnalyticsErrorResponse::new(e)),
            )
        })?;

    debug!(source = ?analytics.source, "Serving dashboard analytics");

    let body = match analytics.source {
        ReportSource::Cached if !app_state.normalize_cached_envelope => {
            DashboardAnalyticsResponse::Cached(CachedAnalyticsResponse {
                message: CACHED_DATA_MESSAGE.to_string(),
                cache_analytics: analytics.report,
            })
        }
        _ => DashboardAnalyticsResponse::Fresh(analytics.report),
    };

    Ok(ResponseJson(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::analytics::ports::MockAnalyticsServiceTrait;
    use services::analytics::{AnalyticsError, DashboardAnalytics, Report};
    use services::common::RepositoryError;

    fn empty_report() -> Arc<Report> {
        Arc::new(Report {
            active_users: 0,
            total_products: 0,
            total_revenue: 0.0,
            total_orders: 0,
            monthly_sales_data: vec![],
            inventory_metrics: Default::default(),
            customer_analytics: Default::default(),
            kpis: Default::default(),
        })
    }

    fn state_returning(source: ReportSource, normalize: bool) -> AnalyticsAppState {
        let mut service = MockAnalyticsServiceTrait::new();
        service.expect_get_dashboard_analytics().returning(move || {
            Ok(DashboardAnalytics {
                report: empty_report(),
                source,
            })
        });
        AnalyticsAppState {
            analytics_service: Arc::new(service),
            normalize_cached_envelope: normalize,
        }
    }

    #[tokio::test]
    async fn test_cached_report_is_wrapped() {
        let ResponseJson(body) =
            get_dashboard_analytics(State(state_returning(ReportSource::Cached, false)))
                .await
                .unwrap();

        match body {
            DashboardAnalyticsResponse::Cached(cached) => {
                assert_eq!(cached.message, "Cached data:")
            }
            other => panic!("expected cached envelope, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_normalized_cached_report_is_bare() {
        let ResponseJson(body) =
            get_dashboard_analytics(State(state_returning(ReportSource::Cached, true)))
                .await
                .unwrap();

        assert!(matches!(body, DashboardAnalyticsResponse::Fresh(_)));
    }

    #[tokio::test]
    async fn test_failure_maps_to_internal_error() {
        let mut service = MockAnalyticsServiceTrait::new();
        service.expect_get_dashboard_analytics().returning(|| {
            Err(AnalyticsError::StoreUnavailable(
                RepositoryError::ConnectionFailed("refused".to_string()),
            ))
        });
        let state = AnalyticsAppState {
            analytics_service: Arc::new(service),
            normalize_cached_envelope: false,
        };

        let (status, ResponseJson(body)) = get_dashboard_analytics(State(state))
            .await
            .unwrap_err();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Error fetching dashboard analytics");
        assert!(body.error.contains("refused"));
    }
}
