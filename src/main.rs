//! SolarCRM Worker - import service for the GD solar CRM
//!
//! Serves import requests over NATS, or runs one-shot imports from the
//! command line.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solarcrm_worker::cli::{overrides, Cli, Command};
use solarcrm_worker::config::Config;
use solarcrm_worker::services::import_history::ImportHistory;
use solarcrm_worker::services::pipeline::ImportPipeline;
use solarcrm_worker::{commands, db, handlers};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.logs_dir, "worker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Stderr keeps stdout free for reports and JSON output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,solarcrm_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required to run migrations")?;
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await
        }
        Command::Detect { file, kind } => commands::detect(&config, &file, kind).await,
        Command::Import {
            file,
            kind,
            tenant,
            map,
            accept_mapping,
            document_policy,
            json,
        } => {
            commands::import(
                &config,
                &file,
                kind,
                &tenant,
                &overrides(&map),
                accept_mapping,
                document_policy,
                json,
            )
            .await
        }
        Command::Workbook {
            file,
            tenant,
            accept_mapping,
            json,
        } => commands::workbook(&config, &file, &tenant, accept_mapping, json).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting SolarCRM Worker...");

    let store = db::create_store(&config).await?;
    info!("Client store ready ({:?})", config.store_backend);

    let pipeline = Arc::new(ImportPipeline::new(store, config.import));
    let history = Arc::new(ImportHistory::default());

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    if let Err(e) = handlers::start_handlers(nats_client, pipeline, history).await {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}
