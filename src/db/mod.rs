//! Persistence: the client store contract and its backends

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::MemoryClientStore;
pub use postgres::PgClientStore;
pub use store::{create_store, ClientStore, StoreBackend};

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Apply the embedded migrations in `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate!("./migrations");
    info!("Running {} database migration(s)...", migrator.iter().count());

    migrator.run(pool).await.context("Database migration failed")?;

    info!("Database migrations complete");
    Ok(())
}
