use config::DatabaseConfig;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::info;

/// Build a connection pool without opening any connection
pub fn build_pool(config: &DatabaseConfig) -> anyhow::Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.database.clone());
    cfg.user = Some(config.username.clone());
    cfg.password = Some(config.password.clone());
    cfg.connect_timeout = Some(config.query_timeout());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_connections));

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| anyhow::anyhow!("Failed to create pool: {e}"))
}

/// Create a connection pool from configuration and check that it can connect
pub async fn create_pool(config: &DatabaseConfig) -> anyhow::Result<Pool> {
    let pool = build_pool(config)?;

    info!(
        "Database connection pool created: {}:{}/{}",
        config.host, config.port, config.database
    );

    // Test the connection
    let client = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {e}"))?;

    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| anyhow::anyhow!("Failed to test database connection: {e}"))?;
    info!("Database connection test successful");

    Ok(pool)
}

/// Connection pool type alias
pub type DbPool = Pool;
