//! Invoice import flow
//!
//! Utility invoice reports usually start with a preamble (company name,
//! period, logos exported as text), so the header row is searched for within
//! the first rows and columns are matched by keyword. Each invoice is attached
//! to the client owning its installation; installations without a client end
//! up in the not-found list.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ImportSettings;
use crate::db::ClientStore;
use crate::error::{ParseError, StoreError};
use crate::services::header_resolver::{is_keyword_header, resolve_keywords, ConfirmedMapping, FieldSpec};
use crate::services::normalize::{parse_date, parse_money, Parsed};
use crate::services::orchestrator::{
    BatchImporter, ProgressSink, RecordWriter, Staged, WriteOutcome, WriteReport,
};
use crate::services::pipeline::ImportPlan;
use crate::services::tabular::{CellValue, Grid, SheetRow, Table};
use crate::types::{ClientKey, ImportIssue, ImportKind, ImportResult, InvoiceRecord, UpdateClientRequest};

/// Keywords per invoice field. Order matters: earlier fields claim columns first.
pub static INVOICE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        key: "installation_id",
        label: "Instalação",
        required: true,
        candidates: &["instalação", "unidade consumidora", "uc", "installation"],
    },
    FieldSpec {
        key: "amount",
        label: "Valor",
        required: true,
        candidates: &["valor", "total", "amount"],
    },
    FieldSpec {
        key: "due_date",
        label: "Vencimento",
        required: true,
        candidates: &["vencimento", "venc", "due date"],
    },
    FieldSpec {
        key: "reference_month",
        label: "Referência",
        required: false,
        candidates: &["referência", "mês de referência", "competência", "reference"],
    },
    FieldSpec {
        key: "consumption_kwh",
        label: "Consumo (kWh)",
        required: false,
        candidates: &["consumo", "kwh", "consumption"],
    },
    FieldSpec {
        key: "status",
        label: "Situação",
        required: false,
        candidates: &["situação", "status"],
    },
];

pub struct InvoiceImporter {
    store: Arc<dyn ClientStore>,
    settings: ImportSettings,
}

impl InvoiceImporter {
    pub fn new(store: Arc<dyn ClientStore>, settings: ImportSettings) -> Self {
        Self { store, settings }
    }

    /// Find the header row, then propose a keyword mapping.
    pub fn plan(&self, grid: Grid, sheet: Option<String>) -> Result<ImportPlan, ParseError> {
        let header_idx = grid.detect_header_row(self.settings.header_scan_rows, |cell| {
            is_keyword_header(cell, INVOICE_FIELDS)
        });
        let table = grid.into_table(header_idx)?;
        let proposal = resolve_keywords(&table.headers, INVOICE_FIELDS);

        Ok(ImportPlan {
            kind: ImportKind::Invoices,
            sheet,
            table,
            proposal,
        })
    }

    pub async fn run(
        &self,
        tenant_id: &str,
        table: &Table,
        mapping: &ConfirmedMapping,
        progress: &dyn ProgressSink,
    ) -> ImportResult {
        let mut result = ImportResult::new(ImportKind::Invoices, table.rows.len() as u32);
        info!(
            "Importing {} invoice row(s) for tenant {} (header at row {})",
            table.rows.len(),
            tenant_id,
            table.header_row
        );

        let staged: Vec<Staged<InvoiceRecord>> = table
            .rows
            .iter()
            .filter_map(|row| stage(table, row, mapping, &mut result))
            .collect();

        let writer = InvoiceWriter {
            store: self.store.as_ref(),
            tenant_id,
        };
        BatchImporter::new(self.settings.progress_every)
            .run(staged, &writer, progress, &mut result)
            .await;

        result.errors.sort_by_key(|i| i.row_number);
        result.warnings.sort_by_key(|i| i.row_number);
        info!(
            "Invoice import done: {} ok ({} duplicates), {} installations not found, {} errors",
            result.success,
            result.duplicates,
            result.not_found.len(),
            result.failed()
        );
        result
    }
}

fn stage(
    table: &Table,
    row: &SheetRow,
    mapping: &ConfirmedMapping,
    result: &mut ImportResult,
) -> Option<Staged<InvoiceRecord>> {
    let cell = |field: &str| mapping.get(field).map_or(&CellValue::Empty, |c| row.cell(c));

    let Some(installation_id) = cell("installation_id").text() else {
        debug!("Row {}: no installation, skipping", row.number);
        result.skipped += 1;
        return None;
    };

    let due_date = match parse_date(cell("due_date")) {
        Parsed::Value(d) => d,
        Parsed::Missing => {
            result.push_issue(
                ImportIssue::error(row.number, "Vencimento", "Data de vencimento ausente")
                    .with_record(table.row_as_json(row)),
            );
            return None;
        }
        Parsed::Invalid { raw, reason } => {
            result.push_issue(
                ImportIssue::error(row.number, "Vencimento", format!("Data de vencimento inválida: {}", reason))
                    .with_value(raw)
                    .with_record(table.row_as_json(row)),
            );
            return None;
        }
    };

    let amount = match parse_money(cell("amount")) {
        Parsed::Value(v) => {
            if v == 0.0 {
                result.push_issue(ImportIssue::warning(row.number, "Valor", "Fatura com valor zero"));
            }
            v
        }
        Parsed::Missing => {
            result.push_issue(ImportIssue::warning(row.number, "Valor", "Valor ausente, importado como zero"));
            0.0
        }
        Parsed::Invalid { raw, reason } => {
            result.push_issue(
                ImportIssue::warning(row.number, "Valor", format!("{}, importado como zero", reason)).with_value(raw),
            );
            0.0
        }
    };

    Some(Staged {
        row_number: row.number,
        raw: table.row_as_json(row),
        record: InvoiceRecord {
            installation_id,
            due_date,
            amount,
            reference_month: cell("reference_month").text(),
            consumption_kwh: parse_money(cell("consumption_kwh")).ok(),
            status: cell("status").text(),
        },
    })
}

/// Append the invoice to the client of its installation unless it is
/// already there.
struct InvoiceWriter<'a> {
    store: &'a dyn ClientStore,
    tenant_id: &'a str,
}

#[async_trait]
impl RecordWriter<InvoiceRecord> for InvoiceWriter<'_> {
    async fn write(&self, record: &InvoiceRecord) -> Result<WriteReport, StoreError> {
        let key = ClientKey::Installation(record.installation_id.clone());
        let Some(client) = self.store.search(self.tenant_id, &key).await? else {
            return Ok(WriteReport::new(WriteOutcome::NotFound(key.to_string())));
        };

        if client
            .invoices
            .iter()
            .any(|inv| inv.is_same_as(record.due_date, record.amount))
        {
            return Ok(WriteReport::new(WriteOutcome::Duplicate));
        }

        let mut invoices = client.invoices;
        invoices.push(record.to_invoice());
        let patch = UpdateClientRequest {
            invoices: Some(invoices),
            ..Default::default()
        };
        self.store.update(client.id, &patch).await?;

        Ok(WriteReport::new(WriteOutcome::Updated))
    }
}
