pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{build_pool, create_pool, DbPool};
pub use repositories::PgRecordStore;

use anyhow::Result;
use services::analytics::ports::RecordStore;
use std::sync::Arc;
use std::time::Duration;

/// Database service exposing the record store over a shared pool
pub struct Database {
    records: Arc<PgRecordStore>,
    pool: DbPool,
}

impl Database {
    /// Create a new database service from a connection pool
    pub fn new(pool: DbPool, query_timeout: Duration) -> Self {
        Self {
            records: Arc::new(PgRecordStore::new(pool.clone(), query_timeout)),
            pool,
        }
    }

    /// Create a new database service from configuration
    pub async fn from_config(config: &config::DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool, config.query_timeout()))
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    pub fn record_store(&self) -> Arc<dyn RecordStore> {
        self.records.clone()
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
