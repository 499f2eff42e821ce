use crate::pool::DbPool;
use anyhow::{Context, Result};
use refinery::{load_sql_migrations, Migration};
use std::path::PathBuf;
use tracing::info;

const MIGRATIONS_SUBDIR: &str = "src/migrations/sql";

/// Locate the migration SQL files, preferring the workspace-relative path
/// used when running from the repository root.
pub fn migrations_dir() -> PathBuf {
    let from_workspace = std::env::current_dir()
        .map(|dir| dir.join("crates/database").join(MIGRATIONS_SUBDIR))
        .ok()
        .filter(|path| path.is_dir());

    from_workspace.unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(MIGRATIONS_SUBDIR))
}

pub fn load() -> Result<Vec<Migration>> {
    let migrations_path = migrations_dir();
    load_sql_migrations(&migrations_path).context(format!(
        "Failed to load migrations from {migrations_path:?}"
    ))
}

/// Run database migrations
pub async fn run(pool: &DbPool) -> Result<()> {
    let mut client = pool
        .get()
        .await
        .context("Failed to get database connection for migrations")?;

    let migrations = load()?;

    let migration_report = refinery::Runner::new(&migrations)
        .run_async(&mut **client)
        .await
        .context("Failed to run migrations")?;

    for migration in migration_report.applied_migrations() {
        info!("Applied migration: {}", migration.name());
    }

    info!("All migrations completed successfully");
    Ok(())
}
