//! Client store contract

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Config;
use crate::error::StoreError;
use crate::types::{Client, ClientKey, CreateClientRequest, Plant, UpdateClientRequest};

use super::memory::MemoryClientStore;
use super::postgres::PgClientStore;

/// Persistence used by the import flows. All lookups are tenant-scoped.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// First client of the tenant matching the natural key.
    async fn search(&self, tenant_id: &str, key: &ClientKey) -> Result<Option<Client>, StoreError>;

    async fn create(&self, tenant_id: &str, record: &CreateClientRequest) -> Result<Client, StoreError>;

    /// Apply a partial update. Last write wins.
    async fn update(&self, id: Uuid, patch: &UpdateClientRequest) -> Result<Client, StoreError>;

    /// Plant by name (case-insensitive); `true` when it was just created.
    async fn find_or_create_plant(&self, tenant_id: &str, name: &str) -> Result<(Plant, bool), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            other => bail!("Unknown STORE_BACKEND '{}' (expected memory or postgres)", other),
        }
    }
}

/// Build the store selected by the configuration.
pub async fn create_store(config: &Config) -> Result<Arc<dyn ClientStore>> {
    match config.store_backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryClientStore::new())),
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            let pool = super::create_pool(url).await?;
            super::run_migrations(&pool).await?;
            Ok(Arc::new(PgClientStore::new(pool)))
        }
    }
}
