use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use database::Database;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    // Initialize tracing for CLI output
    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!("Starting database seeding");

    let db_config = config::DatabaseConfig::from_env()
        .map_err(|e| anyhow!("Failed to load database config: {e}"))?;

    let database = Database::from_config(&db_config)
        .await
        .context("Failed to connect to database")?;
    info!(
        host = %db_config.host,
        database = %db_config.database,
        "Connected to database"
    );

    database
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let executed = run_seed_scripts(&database, &seed_dir()).await?;
    info!(scripts = executed, "Database seeding completed");
    Ok(())
}

fn seed_dir() -> PathBuf {
    std::env::var("SEED_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("crates/database/src/seed"))
}

/// Execute every `.sql` file in `seed_dir` in file name order
async fn run_seed_scripts(database: &Database, seed_dir: &Path) -> Result<usize> {
    if !seed_dir.exists() {
        return Err(anyhow!("Seed directory not found: {}", seed_dir.display()));
    }

    let mut seed_files: Vec<_> = fs::read_dir(seed_dir)
        .context("Failed to read seed directory")?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            path.extension()
                .is_some_and(|ext| ext == "sql")
                .then_some(path)
        })
        .collect();
    seed_files.sort();

    if seed_files.is_empty() {
        info!("No seed files found, skipping seed scripts");
        return Ok(0);
    }

    let client = database
        .pool()
        .get()
        .await
        .context("Failed to get database connection")?;

    for seed_file in &seed_files {
        let file_name = seed_file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        let sql = fs::read_to_string(seed_file)
            .context(format!("Failed to read seed file: {}", seed_file.display()))?;

        client
            .batch_execute(&sql)
            .await
            .context(format!("Failed to execute seed script: {file_name}"))?;

        info!("Executed seed script: {}", file_name);
    }

    Ok(seed_files.len())
}
