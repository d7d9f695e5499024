//! Configuration management

use anyhow::{Context, Result};

use crate::db::StoreBackend;
use crate::defaults::{DEFAULT_HEADER_SCAN_ROWS, DEFAULT_PROGRESS_EVERY};
use crate::services::tabular::ReaderOptions;
use crate::types::DocumentPolicy;

/// Knobs shared by both import flows
#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    /// What to do with rows whose CPF/CNPJ fails the checksum
    pub document_policy: DocumentPolicy,
    /// Rows searched for the invoice header
    pub header_scan_rows: usize,
    pub progress_every: usize,
    pub reader: ReaderOptions,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            document_policy: DocumentPolicy::default(),
            header_scan_rows: DEFAULT_HEADER_SCAN_ROWS,
            progress_every: DEFAULT_PROGRESS_EVERY,
            reader: ReaderOptions::default(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// PostgreSQL connection string, required by the postgres store
    pub database_url: Option<String>,

    pub store_backend: StoreBackend,

    pub logs_dir: String,

    pub import: ImportSettings,
}

impl Config {
    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let nats_url = var("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());
        let database_url = var("DATABASE_URL").filter(|u| !u.trim().is_empty());

        // Postgres when a database is configured, memory otherwise.
        let store_backend = match var("STORE_BACKEND") {
            Some(s) => s.parse()?,
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let logs_dir = var("LOGS_DIR").unwrap_or_else(|| "logs".to_string());

        let mut import = ImportSettings::default();
        if let Some(policy) = var("IMPORT_DOCUMENT_POLICY") {
            import.document_policy = policy
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Invalid IMPORT_DOCUMENT_POLICY")?;
        }
        if let Some(rows) = var("IMPORT_HEADER_SCAN_ROWS") {
            import.header_scan_rows = rows.trim().parse().context("Invalid IMPORT_HEADER_SCAN_ROWS")?;
        }
        if let Some(every) = var("IMPORT_PROGRESS_EVERY") {
            import.progress_every = every.trim().parse().context("Invalid IMPORT_PROGRESS_EVERY")?;
        }
        if let Some(raw) = var("IMPORT_RAW_SERIAL_DATES") {
            import.reader.raw_serial_dates = parse_flag(&raw).context("Invalid IMPORT_RAW_SERIAL_DATES")?;
        }

        Ok(Self {
            nats_url,
            database_url,
            store_backend,
            logs_dir,
            import,
        })
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => anyhow::bail!("expected true/false, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.import.document_policy, DocumentPolicy::Warn);
        assert_eq!(config.import.header_scan_rows, 50);
        assert_eq!(config.import.progress_every, 10);
    }

    #[test]
    fn test_database_url_selects_postgres() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/solarcrm")]).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn test_postgres_requires_database_url() {
        assert!(config(&[("STORE_BACKEND", "postgres")]).is_err());
    }

    #[test]
    fn test_import_overrides() {
        let config = config(&[
            ("IMPORT_DOCUMENT_POLICY", "rejeitar"),
            ("IMPORT_HEADER_SCAN_ROWS", "20"),
            ("IMPORT_PROGRESS_EVERY", "5"),
        ])
        .unwrap();
        assert_eq!(config.import.document_policy, DocumentPolicy::Reject);
        assert_eq!(config.import.header_scan_rows, 20);
        assert_eq!(config.import.progress_every, 5);
    }

    #[test]
    fn test_raw_serial_dates_flag() {
        assert!(!config(&[]).unwrap().import.reader.raw_serial_dates);
        assert!(config(&[("IMPORT_RAW_SERIAL_DATES", "true")]).unwrap().import.reader.raw_serial_dates);
        assert!(config(&[("IMPORT_RAW_SERIAL_DATES", "1")]).unwrap().import.reader.raw_serial_dates);
        assert!(!config(&[("IMPORT_RAW_SERIAL_DATES", "0")]).unwrap().import.reader.raw_serial_dates);
        assert!(config(&[("IMPORT_RAW_SERIAL_DATES", "sim")]).is_err());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(config(&[("IMPORT_PROGRESS_EVERY", "often")]).is_err());
        assert!(config(&[("IMPORT_DOCUMENT_POLICY", "maybe")]).is_err());
    }
}
