#![allow(dead_code)]

use api::{build_app, init_analytics_service, AppState};
use chrono::{DateTime, Duration, TimeZone, Utc};
use config::{AnalyticsConfig, ServerConfig};
use services::analytics::models::{OrderRecord, ProductRecord, UserRecord};
use services::analytics::{ClockedReportCache, InMemoryRecordStore, ManualClock};
use services::metrics::capturing::CapturingMetricsService;
use std::sync::Arc;

pub const FRONTEND_ORIGIN: &str = "http://localhost:5173";

/// Fixed "now" for every test server
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

pub fn test_server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        frontend_url: FRONTEND_ORIGIN.to_string(),
    }
}

/// Test server plus handles on its collaborators
pub struct TestContext {
    pub server: axum_test::TestServer,
    pub store: Arc<InMemoryRecordStore>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<ClockedReportCache>,
    pub metrics: Arc<CapturingMetricsService>,
}

/// Setup a complete test server over an in-memory store and a manual clock
pub async fn setup_test_server(analytics: AnalyticsConfig) -> TestContext {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::level_filters::LevelFilter::DEBUG)
        .try_init();

    let store = Arc::new(InMemoryRecordStore::new());
    let clock = Arc::new(ManualClock::new(test_now()));
    let cache = Arc::new(ClockedReportCache::new(analytics.cache_ttl(), clock.clone()));
    let metrics = Arc::new(CapturingMetricsService::new());

    let analytics_service = init_analytics_service(
        store.clone(),
        cache.clone(),
        clock.clone(),
        metrics.clone(),
        &analytics,
    );
    let state = AppState {
        analytics_service,
        metrics_service: metrics.clone(),
        normalize_cached_envelope: analytics.normalize_cached_envelope,
    };

    let app = build_app(state, &test_server_config()).unwrap();
    let server = axum_test::TestServer::new(app).unwrap();

    TestContext {
        server,
        store,
        clock,
        cache,
        metrics,
    }
}

pub async fn add_user(store: &InMemoryRecordStore, id: &str) {
    store.insert_user(UserRecord { id: id.to_string() }).await;
}

pub async fn add_product(store: &InMemoryRecordStore, id: &str, stock: i64) {
    store
        .insert_product(ProductRecord {
            id: id.to_string(),
            stock,
        })
        .await;
}

pub async fn add_order(
    store: &InMemoryRecordStore,
    id: &str,
    user_id: &str,
    total_amount: f64,
    days_ago: i64,
) {
    store
        .insert_order(OrderRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            total_amount,
            order_date: test_now() - Duration::days(days_ago),
        })
        .await;
}

/// Three users, four products and four orders spread over two months
pub async fn seed_store(store: &InMemoryRecordStore) {
    for id in ["u1", "u2", "u3"] {
        add_user(store, id).await;
    }
    add_product(store, "p1", 0).await;
    add_product(store, "p2", 5).await;
    add_product(store, "p3", 50).await;
    add_product(store, "p4", 45).await;

    // u1: recent and heavy spender; u2: 10 days ago; u3: long gone
    add_order(store, "o1", "u1", 900.0, 1).await;
    add_order(store, "o2", "u1", 300.0, 3).await;
    add_order(store, "o3", "u2", 100.0, 10).await;
    add_order(store, "o4", "u3", 50.0, 40).await;
}
