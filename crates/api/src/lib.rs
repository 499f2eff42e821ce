pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;

use crate::{
    middleware::{http_metrics_middleware, MetricsState},
    openapi::ApiDoc,
    routes::{
        analytics::{get_dashboard_analytics, AnalyticsAppState},
        health::{health_check, root},
    },
};
use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use config::{AnalyticsConfig, ApiConfig, OtlpConfig, ServerConfig, StoreBackend};
use database::Database;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use services::{
    analytics::{
        AnalyticsServiceImpl, AnalyticsServiceTrait, Clock, InMemoryRecordStore, MokaReportCache,
        RecordStore, ReportAssembler, ReportCache, StockThresholds, SystemClock,
    },
    metrics::{MetricsServiceTrait, MockMetricsService, OtlpMetricsService},
};
use std::{sync::Arc, time::Duration};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

/// Services shared by the HTTP layer
#[derive(Clone)]
pub struct AppState {
    pub analytics_service: Arc<dyn AnalyticsServiceTrait>,
    pub metrics_service: Arc<dyn MetricsServiceTrait>,
    pub normalize_cached_envelope: bool,
}

/// Open the configured record store. The Postgres backend is migrated before use.
pub async fn init_record_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    match config.store.backend {
        StoreBackend::Postgres => {
            let database = Database::from_config(&config.database)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Starting database migrations...");
            database
                .run_migrations()
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations completed.");

            Ok(database.record_store())
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory record store; records are not persisted");
            Ok(Arc::new(InMemoryRecordStore::new()))
        }
    }
}

/// Build the OTLP metrics pipeline, or a no-op sink when no endpoint is configured.
///
/// The returned provider must be kept alive and shut down on exit to flush
/// pending exports.
pub fn init_metrics(
    config: &OtlpConfig,
) -> anyhow::Result<(Arc<dyn MetricsServiceTrait>, Option<SdkMeterProvider>)> {
    use opentelemetry_otlp::WithExportConfig;

    let Some(endpoint) = &config.endpoint else {
        tracing::info!("OTLP endpoint not configured, metrics export disabled");
        return Ok((Arc::new(MockMetricsService), None));
    };

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint.clone())
        .build()
        .context("Failed to build OTLP metric exporter")?;
    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(config.export_interval_secs))
        .build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();

    tracing::info!(endpoint = %endpoint, "OTLP metrics export enabled");
    Ok((Arc::new(OtlpMetricsService::new(&provider)), Some(provider)))
}

/// Wire the analytics service from its collaborators
pub fn init_analytics_service(
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn ReportCache>,
    clock: Arc<dyn Clock>,
    metrics_service: Arc<dyn MetricsServiceTrait>,
    config: &AnalyticsConfig,
) -> Arc<AnalyticsServiceImpl> {
    let assembler = ReportAssembler::new(store, clock, StockThresholds::from(config));
    Arc::new(
        AnalyticsServiceImpl::new(assembler, cache, metrics_service)
            .with_single_flight(config.single_flight),
    )
}

/// Production wiring: system clock and a moka-backed report cache
pub fn init_app_state(
    store: Arc<dyn RecordStore>,
    metrics_service: Arc<dyn MetricsServiceTrait>,
    config: &AnalyticsConfig,
) -> AppState {
    let cache = Arc::new(MokaReportCache::new(config.cache_ttl()));
    let analytics_service = init_analytics_service(
        store,
        cache,
        Arc::new(SystemClock),
        metrics_service.clone(),
        config,
    );

    AppState {
        analytics_service,
        metrics_service,
        normalize_cached_envelope: config.normalize_cached_envelope,
    }
}

/// CORS policy allowing the dashboard frontend, with credentials
pub fn build_cors_layer(server: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let origin = HeaderValue::from_str(&server.frontend_url)
        .with_context(|| format!("Invalid FRONTEND_URL: {}", server.frontend_url))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]))
}

/// Build the complete application router
pub fn build_app(state: AppState, server: &ServerConfig) -> anyhow::Result<Router> {
    let metrics_state = MetricsState {
        metrics_service: state.metrics_service.clone(),
    };

    let analytics_routes = Router::new()
        .route("/api/dashboard/analytics", get(get_dashboard_analytics))
        .with_state(AnalyticsAppState {
            analytics_service: state.analytics_service,
            normalize_cached_envelope: state.normalize_cached_envelope,
        });

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .merge(analytics_routes)
        .merge(build_openapi_routes())
        .layer(from_fn_with_state(metrics_state, http_metrics_middleware))
        .layer(CompressionLayer::new().gzip(true))
        .layer(build_cors_layer(server)?)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

/// Build OpenAPI documentation routes
pub fn build_openapi_routes() -> Router {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    )
}
