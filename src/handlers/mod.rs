//! NATS message handlers

pub mod import;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use tokio::select;
use tracing::{error, info};

use crate::services::import_history::ImportHistory;
use crate::services::import_processor::ImportProcessor;
use crate::services::pipeline::ImportPipeline;

pub const SUBJECT_DETECT: &str = "solarcrm.import.detect";
pub const SUBJECT_SUBMIT: &str = "solarcrm.import.submit";
pub const SUBJECT_HISTORY: &str = "solarcrm.import.history";

/// Start all message handlers and the job processor. Returns when any of
/// them stops.
pub async fn start_handlers(client: Client, pipeline: Arc<ImportPipeline>, history: Arc<ImportHistory>) -> Result<()> {
    info!("Starting message handlers...");

    let processor = Arc::new(ImportProcessor::new(client.clone(), Arc::clone(&pipeline), Arc::clone(&history)).await?);

    let detect_sub = client.subscribe(SUBJECT_DETECT).await?;
    let client_detect = client.clone();
    let pipeline_detect = Arc::clone(&pipeline);
    let detect_handle = tokio::spawn(async move {
        if let Err(e) = import::handle_detect(client_detect, detect_sub, pipeline_detect).await {
            error!("Import detect handler error: {}", e);
        }
    });

    let submit_sub = client.subscribe(SUBJECT_SUBMIT).await?;
    let client_submit = client.clone();
    let processor_submit = Arc::clone(&processor);
    let submit_handle = tokio::spawn(async move {
        if let Err(e) = import::handle_submit(client_submit, submit_sub, pipeline, processor_submit).await {
            error!("Import submit handler error: {}", e);
        }
    });

    let history_sub = client.subscribe(SUBJECT_HISTORY).await?;
    let client_history = client.clone();
    let history_handle = tokio::spawn(async move {
        if let Err(e) = import::handle_history(client_history, history_sub, history).await {
            error!("Import history handler error: {}", e);
        }
    });

    let processor_handle = tokio::spawn(async move {
        if let Err(e) = processor.start_processing().await {
            error!("Import processor error: {}", e);
        }
    });

    info!("All handlers started, waiting for messages...");

    // Wait for any handler to finish (which means an error occurred)
    select! {
        result = detect_handle => error!("Detect handler finished: {:?}", result),
        result = submit_handle => error!("Submit handler finished: {:?}", result),
        result = history_handle => error!("History handler finished: {:?}", result),
        result = processor_handle => error!("Import processor finished: {:?}", result),
    }

    Ok(())
}
