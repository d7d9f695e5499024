//! Import request handlers: detect, submit, history

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::MappingError;
use crate::services::import_history::ImportHistory;
use crate::services::import_processor::ImportProcessor;
use crate::services::pipeline::ImportPipeline;
use crate::types::{DetectRequest, ErrorResponse, HistoryRequest, ImportJobRequest, Request, SuccessResponse};

async fn reply<T: Serialize>(client: &Client, reply: async_nats::Subject, body: &T) -> Result<()> {
    client.publish(reply, serde_json::to_vec(body)?.into()).await?;
    Ok(())
}

/// Next request on `subscriber` that carries a reply subject and a valid payload.
/// Malformed payloads are answered with `INVALID_REQUEST` and skipped.
async fn next_request<T>(client: &Client, subscriber: &mut Subscriber) -> Option<(async_nats::Subject, Request<T>)>
where
    T: serde::de::DeserializeOwned,
{
    while let Some(msg) = subscriber.next().await {
        let Some(reply_to) = msg.reply.clone() else {
            warn!("Message on {} without reply subject", msg.subject);
            continue;
        };
        match serde_json::from_slice::<Request<T>>(&msg.payload) {
            Ok(request) => return Some((reply_to, request)),
            Err(e) => {
                error!("Failed to parse request on {}: {}", msg.subject, e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                if let Err(e) = reply(client, reply_to, &error).await {
                    error!("Failed to send error reply: {}", e);
                }
            }
        }
    }
    None
}

fn mapping_error(request_id: Uuid, e: &MappingError) -> ErrorResponse {
    let response = ErrorResponse::new(request_id, "MAPPING_ERROR", e.to_string());
    match e {
        MappingError::MissingRequired(fields) => response.with_details(serde_json::json!(fields)),
        _ => response,
    }
}

/// `solarcrm.import.detect`: proposed mapping and preview for a file
pub async fn handle_detect(client: Client, mut subscriber: Subscriber, pipeline: Arc<ImportPipeline>) -> Result<()> {
    while let Some((reply_to, request)) = next_request::<DetectRequest>(&client, &mut subscriber).await {
        debug!("Detect request for '{}'", request.payload.file.file_name);

        let response = match request.payload.file.decode() {
            Err(e) => serde_json::to_value(ErrorResponse::new(request.id, "INVALID_FILE", e.to_string()))?,
            Ok(bytes) => match pipeline.inspect(request.payload.kind, &request.payload.file.file_name, &bytes) {
                Ok(plan) => serde_json::to_value(SuccessResponse::new(request.id, plan.review()))?,
                Err(e) => serde_json::to_value(ErrorResponse::new(request.id, "PARSE_ERROR", e.to_string()))?,
            },
        };

        if let Err(e) = reply(&client, reply_to, &response).await {
            error!("Failed to send detect reply: {}", e);
        }
    }
    Ok(())
}

/// `solarcrm.import.submit`: check the mapping, then queue the job
pub async fn handle_submit(
    client: Client,
    mut subscriber: Subscriber,
    pipeline: Arc<ImportPipeline>,
    processor: Arc<ImportProcessor>,
) -> Result<()> {
    while let Some((reply_to, request)) = next_request::<ImportJobRequest>(&client, &mut subscriber).await {
        let job = request.payload;

        // Reject an incomplete mapping now rather than after queueing.
        let checked = job
            .file
            .decode()
            .map_err(|e| ErrorResponse::new(request.id, "INVALID_FILE", e.to_string()))
            .and_then(|bytes| {
                pipeline
                    .inspect(job.kind, &job.file.file_name, &bytes)
                    .map_err(|e| ErrorResponse::new(request.id, "PARSE_ERROR", e.to_string()))
            })
            .and_then(|plan| plan.confirm(&job.overrides).map_err(|e| mapping_error(request.id, &e)));

        let response = match checked {
            Err(error) => serde_json::to_value(error)?,
            Ok(_) => match processor.submit_job(job).await {
                Ok(submitted) => serde_json::to_value(SuccessResponse::new(request.id, submitted))?,
                Err(e) => {
                    error!("Failed to submit import job: {}", e);
                    serde_json::to_value(ErrorResponse::new(request.id, "SUBMIT_ERROR", e.to_string()))?
                }
            },
        };

        if let Err(e) = reply(&client, reply_to, &response).await {
            error!("Failed to send submit reply: {}", e);
        }
    }
    Ok(())
}

/// `solarcrm.import.history`: recent runs of a tenant
pub async fn handle_history(client: Client, mut subscriber: Subscriber, history: Arc<ImportHistory>) -> Result<()> {
    while let Some((reply_to, request)) = next_request::<HistoryRequest>(&client, &mut subscriber).await {
        let runs = history.recent_for_tenant(&request.payload.tenant_id, request.payload.limit);
        let response = SuccessResponse::new(request.id, runs);
        if let Err(e) = reply(&client, reply_to, &response).await {
            error!("Failed to send history reply: {}", e);
        }
    }
    Ok(())
}
