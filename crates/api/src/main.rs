use anyhow::Context;
use api::{build_app, init_app_state, init_metrics, init_record_store};
use config::{ApiConfig, LoggingConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    // Load configuration first to get logging settings
    let config = ApiConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Application cannot start without a valid configuration.");
        std::process::exit(1);
    });

    init_tracing(&config.logging);

    let (metrics_service, meter_provider) = init_metrics(&config.otlp)?;
    let store = init_record_store(&config).await?;
    let state = init_app_state(store, metrics_service, &config.analytics);
    let app = build_app(state, &config.server)?;

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    info!(
        address = %bind_address,
        store = ?config.store.backend,
        cache_ttl_secs = config.analytics.cache_ttl_secs,
        single_flight = config.analytics.single_flight,
        "Server started successfully"
    );
    info!("  - GET /");
    info!("  - GET /health");
    info!("  - GET /api/dashboard/analytics");
    info!("  - GET /api-docs/openapi.json");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(provider) = meter_provider {
        if let Err(e) = provider.shutdown() {
            warn!(error = %e, "Failed to flush metrics on shutdown");
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_tracing(logging_config: &LoggingConfig) {
    let filter = logging_config.filter_directive();

    // Initialize tracing based on the format specified in config
    match logging_config.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .init();
        }
    }
}
