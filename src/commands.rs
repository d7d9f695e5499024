//! One-shot CLI commands: detect, import and workbook.
//!
//! Each command reads a local file, shows the proposed mapping and only
//! writes to the store once the operator passes `--accept-mapping`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::db::create_store;
use crate::services::header_resolver::MappingOverrides;
use crate::services::pipeline::{ImportPipeline, PlanReview};
use crate::services::report::format_report;
use crate::services::workbook::{SheetImport, WorkbookProcessor};
use crate::types::{DocumentPolicy, ImportKind, ImportProgress, ImportResult};

/// What a file command produced
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CommandOutcome {
    /// Mapping not accepted yet: nothing was written
    Review(Vec<PlanReview>),
    Imported(Vec<SheetImport>),
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("Invalid file path: {}", path.display()))
}

fn read_file(path: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((file_name(path)?, bytes))
}

fn log_progress(progress: ImportProgress) {
    info!("Imported {}/{} ({}%)", progress.current, progress.total, progress.percent);
}

async fn build_pipeline(config: &Config, policy: Option<DocumentPolicy>) -> Result<ImportPipeline> {
    let store = create_store(config).await?;
    let mut settings = config.import;
    if let Some(policy) = policy {
        settings.document_policy = policy;
    }
    Ok(ImportPipeline::new(store, settings))
}

fn print_reviews(reviews: &[PlanReview]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(reviews)?);
    println!("Mapeamento proposto. Revise e use --accept-mapping (e --map campo=coluna) para importar.");
    Ok(())
}

fn print_results(results: &[SheetImport], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }
    for sheet in results {
        if !sheet.sheet.is_empty() {
            println!("== {} ==", sheet.sheet);
        }
        println!("{}", format_report(&sheet.result));
    }
    if results.len() > 1 {
        let total = summarize(results);
        info!(
            "Workbook done: {} of {} records imported across {} sheets",
            total.success,
            total.total,
            results.len()
        );
    }
    Ok(())
}

fn print_outcome(outcome: &CommandOutcome, json: bool) -> Result<()> {
    match outcome {
        CommandOutcome::Review(reviews) => print_reviews(reviews),
        CommandOutcome::Imported(results) => print_results(results, json),
    }
}

/// Show the proposed mapping and preview of one file.
pub async fn detect(config: &Config, path: &Path, kind: ImportKind) -> Result<()> {
    let (name, bytes) = read_file(path)?;
    let pipeline = build_pipeline(config, None).await?;
    let plan = pipeline.inspect(kind, &name, &bytes)?;
    print_reviews(&[plan.review()])
}

/// Import a single file of `kind`.
#[allow(clippy::too_many_arguments)]
pub async fn import(
    config: &Config,
    path: &Path,
    kind: ImportKind,
    tenant_id: &str,
    overrides: &MappingOverrides,
    accept_mapping: bool,
    policy: Option<DocumentPolicy>,
    json: bool,
) -> Result<()> {
    let (name, bytes) = read_file(path)?;
    let pipeline = build_pipeline(config, policy).await?;
    let outcome = import_bytes(&pipeline, kind, tenant_id, &name, &bytes, overrides, accept_mapping).await?;
    print_outcome(&outcome, json)
}

pub async fn import_bytes(
    pipeline: &ImportPipeline,
    kind: ImportKind,
    tenant_id: &str,
    file_name: &str,
    bytes: &[u8],
    overrides: &MappingOverrides,
    accept_mapping: bool,
) -> Result<CommandOutcome> {
    let plan = pipeline.inspect(kind, file_name, bytes)?;
    if !accept_mapping {
        return Ok(CommandOutcome::Review(vec![plan.review()]));
    }

    let mapping = plan.confirm(overrides)?;
    info!("Importing '{}' as {} for tenant {}", file_name, kind, tenant_id);
    let result = pipeline.run(tenant_id, &plan, &mapping, &log_progress).await;
    Ok(CommandOutcome::Imported(vec![SheetImport {
        sheet: plan.sheet.clone().unwrap_or_default(),
        result,
    }]))
}

/// Import every recognised sheet of a workbook.
pub async fn workbook(config: &Config, path: &Path, tenant_id: &str, accept_mapping: bool, json: bool) -> Result<()> {
    let (name, bytes) = read_file(path)?;
    let pipeline = build_pipeline(config, None).await?;
    let outcome = workbook_bytes(&pipeline, tenant_id, &name, &bytes, accept_mapping).await?;
    print_outcome(&outcome, json)
}

pub async fn workbook_bytes(
    pipeline: &ImportPipeline,
    tenant_id: &str,
    file_name: &str,
    bytes: &[u8],
    accept_mapping: bool,
) -> Result<CommandOutcome> {
    let processor = WorkbookProcessor::new(pipeline);
    let plans = processor.plan(file_name, bytes)?;
    if !accept_mapping {
        return Ok(CommandOutcome::Review(plans.iter().map(|p| p.review()).collect()));
    }

    // Every sheet must confirm before any of them is written.
    let mut confirmed = Vec::with_capacity(plans.len());
    for plan in plans {
        let mapping = plan
            .confirm(&MappingOverrides::new())
            .with_context(|| format!("Sheet '{}'", plan.sheet.as_deref().unwrap_or_default()))?;
        confirmed.push((plan, mapping));
    }
    Ok(CommandOutcome::Imported(processor.run(tenant_id, &confirmed, &log_progress).await))
}

/// Total across sheets, used for the exit summary.
pub fn summarize(results: &[SheetImport]) -> ImportResult {
    let mut iter = results.iter();
    let Some(first) = iter.next() else {
        return ImportResult::new(ImportKind::Clients, 0);
    };
    let mut total = first.result.clone();
    for sheet in iter {
        total.merge(sheet.result.clone());
    }
    total
}
