use crate::models::*;
use crate::routes::health::HealthResponse;
use services::analytics::models::{
    CustomerAnalytics, CustomerProfile, CustomerSegment, InventoryHealth, Kpis,
    MonthlySalesPoint, Report,
};
use utoipa::OpenApi;

/// OpenAPI documentation configuration
#[derive(OpenApi)]
#[openapi(
    info(
        title = "E-commerce Analytics API",
        description = "Dashboard analytics over users, products and orders: activity, revenue, inventory health, customer segmentation and derived KPIs.",
        version = "1.0.0",
        license(
            name = "MIT",
        )
    ),
    paths(
        crate::routes::health::root,
        crate::routes::health::health_check,
        crate::routes::analytics::get_dashboard_analytics,
    ),
    components(
        schemas(
            HealthResponse,
            DashboardAnalyticsResponse, CachedAnalyticsResponse, AnalyticsErrorResponse,
            Report, MonthlySalesPoint, InventoryHealth, CustomerAnalytics, CustomerProfile,
            CustomerSegment, Kpis,
        )
    ),
    tags(
        (name = "Health", description = "Liveness endpoints"),
        (name = "Analytics", description = "Dashboard analytics report"),
    )
)]
pub struct ApiDoc;
