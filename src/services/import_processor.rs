//! Import JetStream processor
//!
//! Queues import jobs on JetStream and processes them one at a time:
//! - persistence across worker restarts
//! - status updates on `solarcrm.import.status.<job_id>`
//!
//! ## Streams
//! - `SOLARCRM_IMPORT_JOBS` - client-base and invoice imports

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use async_nats::jetstream::{self, Context as JsContext};
use async_nats::Client;
use futures::StreamExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::import_history::{ImportHistory, RunInfo};
use crate::services::orchestrator::ProgressSink;
use crate::services::pipeline::ImportPipeline;
use crate::services::report::format_report;
use crate::types::{
    ImportJobRequest, ImportJobStatus, ImportJobStatusUpdate, ImportJobSubmitResponse, ImportProgress,
    ImportResult, QueuedImportJob,
};

const STREAM_NAME: &str = "SOLARCRM_IMPORT_JOBS";
const CONSUMER_NAME: &str = "import_workers";
const SUBJECT: &str = "solarcrm.jobs.import";
const STATUS_PREFIX: &str = "solarcrm.import.status";

fn status_subject(job_id: Uuid) -> String {
    format!("{}.{}", STATUS_PREFIX, job_id)
}

fn position_from_depth(depth: u64) -> u32 {
    depth.clamp(1, u64::from(u32::MAX)) as u32
}

/// Publishes progress without waiting for the server
struct JobProgress {
    client: Client,
    job_id: Uuid,
}

impl ProgressSink for JobProgress {
    fn report(&self, progress: ImportProgress) {
        let update = ImportJobStatusUpdate::new(self.job_id, ImportJobStatus::from(progress));
        let payload = match serde_json::to_vec(&update) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize progress for job {}: {}", self.job_id, e);
                return;
            }
        };
        let client = self.client.clone();
        let subject = status_subject(self.job_id);
        tokio::spawn(async move {
            if let Err(e) = client.publish(subject, payload.into()).await {
                warn!("Failed to publish import progress: {}", e);
            }
        });
    }
}

pub struct ImportProcessor {
    client: Client,
    js: JsContext,
    pipeline: Arc<ImportPipeline>,
    history: Arc<ImportHistory>,
}

impl ImportProcessor {
    /// Create the processor, making sure the JetStream stream exists
    pub async fn new(client: Client, pipeline: Arc<ImportPipeline>, history: Arc<ImportHistory>) -> Result<Self> {
        let js = jetstream::new(client.clone());

        let stream_config = jetstream::stream::Config {
            name: STREAM_NAME.to_string(),
            subjects: vec![format!("{}.*", SUBJECT)],
            max_messages: 1_000,
            max_bytes: 200 * 1024 * 1024, // spreadsheets travel base64-encoded
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        js.get_or_create_stream(stream_config).await?;
        info!("JetStream import stream '{}' ready", STREAM_NAME);

        Ok(Self {
            client,
            js,
            pipeline,
            history,
        })
    }

    pub async fn submit_job(&self, request: ImportJobRequest) -> Result<ImportJobSubmitResponse> {
        let job = QueuedImportJob::new(request);
        let job_id = job.id;
        let kind = job.request.kind;
        let file_name = job.request.file.file_name.clone();

        let subject = format!("{}.{}", SUBJECT, kind);
        let payload = serde_json::to_vec(&job)?;
        self.js.publish(subject, payload.into()).await?.await?;

        let position = self.queue_position().await;
        info!("Import job {} submitted: {} ({}), position {}", job_id, file_name, kind, position);
        self.publish_status(job_id, ImportJobStatus::Queued { position }).await?;

        Ok(ImportJobSubmitResponse {
            job_id,
            kind,
            file_name,
            message: "Importação enfileirada".to_string(),
        })
    }

    /// Jobs in the stream, the one just published included. A work-queue
    /// stream keeps a job until it is acked, so this is the queue depth.
    async fn queue_position(&self) -> u32 {
        let depth = match self.js.get_stream(STREAM_NAME).await {
            Ok(mut stream) => match stream.info().await {
                Ok(info) => info.state.messages,
                Err(e) => {
                    warn!("Failed to read import stream info: {}", e);
                    0
                }
            },
            Err(e) => {
                warn!("Failed to get import stream: {}", e);
                0
            }
        };
        position_from_depth(depth)
    }

    pub async fn publish_status(&self, job_id: Uuid, status: ImportJobStatus) -> Result<()> {
        let update = ImportJobStatusUpdate::new(job_id, status);
        let payload = serde_json::to_vec(&update)?;
        self.client.publish(status_subject(job_id), payload.into()).await?;
        Ok(())
    }

    /// Pull jobs from the stream until it closes
    pub async fn start_processing(self: Arc<Self>) -> Result<()> {
        let stream = self.js.get_stream(STREAM_NAME).await?;

        let consumer_config = jetstream::consumer::pull::Config {
            durable_name: Some(CONSUMER_NAME.to_string()),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            max_deliver: 3,
            filter_subject: format!("{}.>", SUBJECT),
            ..Default::default()
        };

        let consumer = stream.get_or_create_consumer(CONSUMER_NAME, consumer_config).await?;
        info!("JetStream import consumer '{}' ready", CONSUMER_NAME);

        let mut messages = consumer.messages().await?;

        // Sequential: one import at a time against the store.
        while let Some(msg) = messages.next().await {
            match msg {
                Ok(msg) => {
                    if let Err(e) = self.process_job(msg).await {
                        error!("Failed to process import job: {}", e);
                    }
                }
                Err(e) => error!("Error receiving import message: {}", e),
            }
        }

        Ok(())
    }

    async fn process_job(&self, msg: jetstream::Message) -> Result<()> {
        let start_time = Instant::now();
        let job: QueuedImportJob = match serde_json::from_slice(&msg.payload) {
            Ok(job) => job,
            Err(e) => {
                // Unreadable payloads would be redelivered forever
                error!("Dropping malformed import job: {}", e);
                if let Err(e) = msg.ack().await {
                    error!("Failed to ack malformed import job: {:?}", e);
                }
                return Ok(());
            }
        };
        let job_id = job.id;
        let run = RunInfo {
            id: job_id,
            tenant_id: job.request.tenant_id.clone(),
            kind: job.request.kind,
            file_name: job.request.file.file_name.clone(),
            submitted_at: job.submitted_at,
            started_at: Utc::now(),
        };

        info!("Processing import job {} ({})", job_id, run.file_name);

        match self.run_job(&job).await {
            Ok(result) => {
                let duration_ms = start_time.elapsed().as_millis() as u64;
                info!(
                    "Import job {} completed in {}ms: {} ok, {} errors",
                    job_id,
                    duration_ms,
                    result.success,
                    result.failed()
                );
                let report = format_report(&result);
                self.history.record_completed(run, result.clone());
                let status = ImportJobStatus::Completed {
                    result,
                    report,
                    duration_ms,
                };
                if let Err(e) = self.publish_status(job_id, status).await {
                    error!("Failed to publish completion of import job {}: {}", job_id, e);
                }
            }
            Err(e) => {
                warn!("Import job {} failed: {:#}", job_id, e);
                self.history.record_failed(run, format!("{:#}", e));
                let status = ImportJobStatus::Failed { error: format!("{:#}", e) };
                if let Err(e) = self.publish_status(job_id, status).await {
                    error!("Failed to publish failure of import job {}: {}", job_id, e);
                }
            }
        }

        // Failures are permanent (bad file, bad mapping): ack either way
        if let Err(e) = msg.ack().await {
            error!("Failed to ack import job {}: {:?}", job_id, e);
        }

        Ok(())
    }

    async fn run_job(&self, job: &QueuedImportJob) -> Result<ImportResult> {
        let request = &job.request;
        self.publish_status(job.id, ImportJobStatus::Parsing).await?;

        let bytes = request.file.decode().context("Arquivo com base64 inválido")?;
        let plan = self
            .pipeline
            .inspect(request.kind, &request.file.file_name, &bytes)?;
        let mapping = plan.confirm(&request.overrides)?;

        let progress = JobProgress {
            client: self.client.clone(),
            job_id: job.id,
        };

        Ok(self
            .pipeline
            .run(&request.tenant_id, &plan, &mapping, &progress)
            .await)
    }
}
