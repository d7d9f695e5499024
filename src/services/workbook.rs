//! Workbook processor
//!
//! Plans every recognised sheet of a workbook: client-base sheets go to the
//! client flow, invoice sheets to the invoice flow, anything else is skipped.
//! Each plan is confirmed on its own before the sheets are imported in order.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ParseError;
use crate::services::header_resolver::ConfirmedMapping;
use crate::services::orchestrator::ProgressSink;
use crate::services::pipeline::{ImportPipeline, ImportPlan};
use crate::services::tabular::{read_workbook, FileFormat};
use crate::services::text::fold;
use crate::types::{ImportKind, ImportResult};

/// Flow for a sheet name, `None` when the sheet is not an import sheet.
pub fn sheet_kind(name: &str) -> Option<ImportKind> {
    match fold(name).as_str() {
        "clientes" | "base de clientes" | "clients" => Some(ImportKind::Clients),
        "faturas" | "invoices" => Some(ImportKind::Invoices),
        _ => None,
    }
}

/// Result of one imported sheet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetImport {
    pub sheet: String,
    pub result: ImportResult,
}

pub struct WorkbookProcessor<'a> {
    pipeline: &'a ImportPipeline,
}

impl<'a> WorkbookProcessor<'a> {
    pub fn new(pipeline: &'a ImportPipeline) -> Self {
        Self { pipeline }
    }

    /// One plan per recognised sheet, in workbook order. Client sheets come
    /// before invoice sheets so invoices can find clients from the same file.
    /// A recognised sheet that cannot be planned (no rows under its header)
    /// is skipped without affecting the others.
    pub fn plan(&self, filename: &str, bytes: &[u8]) -> Result<Vec<ImportPlan>, ParseError> {
        let format = FileFormat::from_filename(filename)?;
        let sheets = read_workbook(bytes, format, self.pipeline.settings().reader)?;

        let mut plans = Vec::new();
        for (name, grid) in sheets {
            let Some(kind) = sheet_kind(&name) else {
                warn!("Sheet '{}' is not an import sheet, skipping", name);
                continue;
            };
            match self.pipeline.plan_grid(kind, grid, Some(name.clone())) {
                Ok(plan) => {
                    info!("Sheet '{}' planned as {} import", name, kind);
                    plans.push(plan);
                }
                Err(e) => warn!("Sheet '{}' cannot be imported, skipping: {}", name, e),
            }
        }
        plans.sort_by_key(|p| p.kind != ImportKind::Clients);

        Ok(plans)
    }

    /// Import confirmed sheets sequentially.
    pub async fn run(
        &self,
        tenant_id: &str,
        confirmed: &[(ImportPlan, ConfirmedMapping)],
        progress: &dyn ProgressSink,
    ) -> Vec<SheetImport> {
        let mut results = Vec::with_capacity(confirmed.len());
        for (plan, mapping) in confirmed {
            let sheet = plan.sheet.clone().unwrap_or_default();
            info!("Importing sheet '{}'", sheet);
            let result = self.pipeline.run(tenant_id, plan, mapping, progress).await;
            results.push(SheetImport { sheet, result });
        }
        results
    }
}
