//! Import pipeline: read → propose mapping → (operator confirms) → import
//!
//! [`ImportPipeline`] is the single entry point used by the CLI and the job
//! processor. Inspecting a file never touches the store; running an import
//! requires a [`ConfirmedMapping`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ImportSettings;
use crate::db::ClientStore;
use crate::error::{ImportError, MappingError, ParseError};
use crate::services::client_import::ClientImporter;
use crate::services::header_resolver::{ConfirmedMapping, MappingOverrides, MappingReview, ProposedMapping};
use crate::services::invoice_import::InvoiceImporter;
use crate::services::orchestrator::ProgressSink;
use crate::services::tabular::{read_grid, FileFormat, Grid, Table};
use crate::types::{ImportKind, ImportResult};

const PREVIEW_ROWS: usize = 5;

/// A parsed sheet with its proposed mapping, waiting for confirmation
#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub kind: ImportKind,
    /// Sheet name for workbook imports
    pub sheet: Option<String>,
    pub table: Table,
    pub proposal: ProposedMapping,
}

impl ImportPlan {
    pub fn confirm(&self, overrides: &MappingOverrides) -> Result<ConfirmedMapping, MappingError> {
        self.proposal.clone().confirm(overrides)
    }

    pub fn review(&self) -> PlanReview {
        PlanReview {
            kind: self.kind,
            sheet: self.sheet.clone(),
            header_row: self.table.header_row,
            total_rows: self.table.rows.len(),
            mapping: self.proposal.review(),
            preview: self
                .table
                .rows
                .iter()
                .take(PREVIEW_ROWS)
                .map(|row| self.table.row_as_json(row))
                .collect(),
        }
    }
}

/// What the operator sees before confirming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReview {
    pub kind: ImportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub header_row: u32,
    pub total_rows: usize,
    pub mapping: MappingReview,
    pub preview: Vec<serde_json::Value>,
}

pub struct ImportPipeline {
    clients: ClientImporter,
    invoices: InvoiceImporter,
    settings: ImportSettings,
}

impl ImportPipeline {
    pub fn new(store: Arc<dyn ClientStore>, settings: ImportSettings) -> Self {
        Self {
            clients: ClientImporter::new(Arc::clone(&store), settings),
            invoices: InvoiceImporter::new(store, settings),
            settings,
        }
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Read the first sheet of `bytes` and propose a mapping for `kind`.
    pub fn inspect(&self, kind: ImportKind, filename: &str, bytes: &[u8]) -> Result<ImportPlan, ParseError> {
        let format = FileFormat::from_filename(filename)?;
        let grid = read_grid(bytes, format, self.settings.reader)?;
        self.plan_grid(kind, grid, None)
    }

    pub fn plan_grid(&self, kind: ImportKind, grid: Grid, sheet: Option<String>) -> Result<ImportPlan, ParseError> {
        match kind {
            ImportKind::Clients => self.clients.plan(grid, sheet),
            ImportKind::Invoices => self.invoices.plan(grid, sheet),
        }
    }

    pub async fn run(
        &self,
        tenant_id: &str,
        plan: &ImportPlan,
        mapping: &ConfirmedMapping,
        progress: &dyn ProgressSink,
    ) -> ImportResult {
        match plan.kind {
            ImportKind::Clients => self.clients.run(tenant_id, &plan.table, mapping, progress).await,
            ImportKind::Invoices => self.invoices.run(tenant_id, &plan.table, mapping, progress).await,
        }
    }

    /// Inspect, confirm with `overrides` and run in one go.
    pub async fn import(
        &self,
        kind: ImportKind,
        tenant_id: &str,
        filename: &str,
        bytes: &[u8],
        overrides: &MappingOverrides,
        progress: &dyn ProgressSink,
    ) -> Result<ImportResult, ImportError> {
        let plan = self.inspect(kind, filename, bytes)?;
        let mapping = plan.confirm(overrides)?;
        Ok(self.run(tenant_id, &plan, &mapping, progress).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryClientStore;
    use crate::services::header_resolver::ColumnRef;
    use crate::services::orchestrator::NoProgress;

    fn pipeline() -> ImportPipeline {
        ImportPipeline::new(Arc::new(MemoryClientStore::new()), ImportSettings::default())
    }

    #[test]
    fn test_inspect_unsupported_format() {
        let err = pipeline().inspect(ImportKind::Clients, "base.pdf", b"x").unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_review_has_preview_and_mapping() {
        let csv = "Nome;CPF\nAna;529.982.247-25\nBia;111.444.777-35\n";
        let plan = pipeline().inspect(ImportKind::Clients, "base.csv", csv.as_bytes()).unwrap();
        let review = plan.review();

        assert_eq!(review.total_rows, 2);
        assert_eq!(review.header_row, 1);
        assert_eq!(review.preview[1]["Nome"], "Bia");

        let json = serde_json::to_value(&review).unwrap();
        assert_eq!(json["kind"], "clients");
        assert!(json.get("sheet").is_none());
        assert_eq!(json["mapping"]["strategy"], "exact");
    }

    #[tokio::test]
    async fn test_import_requires_complete_mapping() {
        let csv = "Cliente;Documento;Fone\nAna;529.982.247-25;1\n";
        let p = pipeline();

        // "Cliente" maps to name; the mapping confirms and the row imports
        let ok = p
            .import(ImportKind::Clients, "gd-sul", "base.csv", csv.as_bytes(), &MappingOverrides::new(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(ok.success, 1);

        let mut overrides = MappingOverrides::new();
        overrides.insert("name".to_string(), None);
        let err = p
            .import(ImportKind::Clients, "gd-sul", "base.csv", csv.as_bytes(), &overrides, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Mapping(MappingError::MissingRequired(_))));
    }

    #[tokio::test]
    async fn test_overrides_fix_a_wrong_guess() {
        let csv = "Instalação;Total Geral;Valor;Vencimento\n3001;999,00;100,00;25/12/2024\n";
        let p = pipeline();
        let plan = p.inspect(ImportKind::Invoices, "faturas.csv", csv.as_bytes()).unwrap();
        assert_eq!(plan.proposal.column_of("amount"), Some(1));

        let mut overrides = MappingOverrides::new();
        overrides.insert("amount".to_string(), Some(ColumnRef::Header("Valor".to_string())));
        let mapping = plan.confirm(&overrides).unwrap();
        assert_eq!(mapping.get("amount"), Some(2));

        let result = p.run("gd-sul", &plan, &mapping, &NoProgress).await;
        // no client owns installation 3001
        assert_eq!(result.not_found.len(), 1);
    }
}
