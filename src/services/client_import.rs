//! Client-base import flow
//!
//! Header row is the first row, headers are looked up by exact spelling.
//! A row reaches the store only with a name and a CPF or CNPJ; anything else
//! is dropped and counted as skipped. Existing clients are matched by their
//! formatted document and updated in place.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ImportSettings;
use crate::db::ClientStore;
use crate::error::{ParseError, StoreError};
use crate::services::document::{digits, format_document, validate_document, DocumentKind};
use crate::services::header_resolver::{resolve_exact, ConfirmedMapping, FieldSpec, MappingWarning};
use crate::services::normalize::{parse_date, parse_percentage, Parsed};
use crate::services::orchestrator::{
    BatchImporter, ProgressSink, RecordWriter, Staged, WriteOutcome, WriteReport,
};
use crate::services::pipeline::ImportPlan;
use crate::services::tabular::{CellValue, Grid, SheetRow, Table};
use crate::types::{
    ClientKey, CreateClientRequest, DocumentPolicy, ImportIssue, ImportKind, ImportResult,
};

/// Known header spellings per client field
pub static CLIENT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        key: "name",
        label: "Nome",
        required: true,
        candidates: &["nome", "nome completo", "name", "cliente", "razão social", "razao social"],
    },
    FieldSpec { key: "cpf", label: "CPF", required: false, candidates: &["cpf"] },
    FieldSpec { key: "cnpj", label: "CNPJ", required: false, candidates: &["cnpj"] },
    FieldSpec {
        key: "document",
        label: "CPF/CNPJ",
        required: false,
        candidates: &["cpf/cnpj", "cpf / cnpj", "cpf_cnpj", "documento", "document"],
    },
    FieldSpec { key: "email", label: "E-mail", required: false, candidates: &["email", "e-mail"] },
    FieldSpec {
        key: "phone",
        label: "Telefone",
        required: false,
        candidates: &["telefone", "phone", "celular", "whatsapp", "fone"],
    },
    FieldSpec {
        key: "street",
        label: "Endereço",
        required: false,
        candidates: &["endereço", "endereco", "address", "rua", "logradouro"],
    },
    FieldSpec {
        key: "city",
        label: "Cidade",
        required: false,
        candidates: &["cidade", "city", "município", "municipio"],
    },
    FieldSpec { key: "state", label: "UF", required: false, candidates: &["uf", "estado", "state"] },
    FieldSpec { key: "postal_code", label: "CEP", required: false, candidates: &["cep", "postal code", "zip"] },
    FieldSpec {
        key: "installation_id",
        label: "Instalação",
        required: false,
        candidates: &[
            "instalação", "instalacao", "nº instalação", "nº da instalação", "uc",
            "unidade consumidora", "installation",
        ],
    },
    FieldSpec { key: "plant", label: "Usina", required: false, candidates: &["usina", "plant", "planta"] },
    FieldSpec {
        key: "discount_percent",
        label: "Desconto (%)",
        required: false,
        candidates: &["desconto", "desconto (%)", "% desconto", "discount"],
    },
    FieldSpec {
        key: "contract_date",
        label: "Data do contrato",
        required: false,
        candidates: &[
            "data do contrato", "data contrato", "data de adesão", "data de adesao", "contract date",
        ],
    },
    FieldSpec {
        key: "notes",
        label: "Observações",
        required: false,
        candidates: &["observações", "observacoes", "obs", "notes"],
    },
];

const DOCUMENT_FIELDS: [&str; 3] = ["cpf", "cnpj", "document"];

pub struct ClientImporter {
    store: Arc<dyn ClientStore>,
    settings: ImportSettings,
}

impl ClientImporter {
    pub fn new(store: Arc<dyn ClientStore>, settings: ImportSettings) -> Self {
        Self { store, settings }
    }

    /// First row is the header; propose the exact-match mapping.
    pub fn plan(&self, grid: Grid, sheet: Option<String>) -> Result<ImportPlan, ParseError> {
        let table = grid.into_table(0)?;
        let mut proposal = resolve_exact(&table.headers, CLIENT_FIELDS);

        if DOCUMENT_FIELDS.iter().all(|f| proposal.column_of(f).is_none()) {
            proposal.warnings.push(MappingWarning {
                field: "document".to_string(),
                message: "Nenhuma coluna de CPF ou CNPJ encontrada; todas as linhas serão ignoradas"
                    .to_string(),
            });
        }

        Ok(ImportPlan {
            kind: ImportKind::Clients,
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
        let mut result = ImportResult::new(ImportKind::Clients, table.rows.len() as u32);
        info!("Importing {} client row(s) for tenant {}", table.rows.len(), tenant_id);

        let staged: Vec<Staged<CreateClientRequest>> = table
            .rows
            .iter()
            .filter_map(|row| self.stage(table, row, mapping, &mut result))
            .collect();

        let writer = ClientWriter {
            store: self.store.as_ref(),
            tenant_id,
        };
        BatchImporter::new(self.settings.progress_every)
            .run(staged, &writer, progress, &mut result)
            .await;

        result.errors.sort_by_key(|i| i.row_number);
        result.warnings.sort_by_key(|i| i.row_number);
        info!(
            "Client import done: {} ok ({} new, {} updated), {} skipped, {} errors",
            result.success,
            result.created,
            result.updated,
            result.skipped,
            result.failed()
        );
        result
    }

    /// Normalize one row and apply the name + document gate and the
    /// document policy. Row-level issues go straight into `result`.
    fn stage(
        &self,
        table: &Table,
        row: &SheetRow,
        mapping: &ConfirmedMapping,
        result: &mut ImportResult,
    ) -> Option<Staged<CreateClientRequest>> {
        let cell = |field: &str| mapping.get(field).map_or(&CellValue::Empty, |c| row.cell(c));
        let text = |field: &str| cell(field).text();

        let mut cpf = text("cpf");
        let mut cnpj = text("cnpj");
        // The combined column goes to the slot of its kind; other lengths count as CPF.
        let mut ignored_document = None;
        if let Some(doc) = text("document") {
            let kind = DocumentKind::of(&doc).unwrap_or(DocumentKind::Cpf);
            let slot = match kind {
                DocumentKind::Cpf => &mut cpf,
                DocumentKind::Cnpj => &mut cnpj,
            };
            if slot.is_none() {
                *slot = Some(doc);
            } else if slot.as_deref().map(digits) != Some(digits(&doc)) {
                ignored_document = Some((kind, doc));
            }
        }

        let name = match text("name") {
            Some(name) if cpf.is_some() || cnpj.is_some() => name,
            _ => {
                debug!("Row {}: no name or document, skipping", row.number);
                result.skipped += 1;
                return None;
            }
        };

        let cpf = cpf.map(|d| format_document(&d));
        let cnpj = cnpj.map(|d| format_document(&d));
        let mut issues = Vec::new();

        if let Some((kind, doc)) = ignored_document {
            issues.push(
                ImportIssue::warning(
                    row.number,
                    "CPF/CNPJ",
                    format!("{} ignorado: a coluna {} já está preenchida", kind.label(), kind.label()),
                )
                .with_value(doc),
            );
        }

        for (label, doc) in [("CPF", &cpf), ("CNPJ", &cnpj)] {
            let Some(doc) = doc else { continue };
            if validate_document(doc) {
                continue;
            }
            match self.settings.document_policy {
                DocumentPolicy::Accept => {}
                DocumentPolicy::Warn => issues.push(
                    ImportIssue::warning(row.number, label, format!("{} inválido", label)).with_value(doc.clone()),
                ),
                DocumentPolicy::Reject => {
                    result.push_issue(
                        ImportIssue::error(row.number, label, format!("{} inválido", label))
                            .with_value(doc.clone())
                            .with_record(table.row_as_json(row)),
                    );
                    return None;
                }
            }
        }

        let discount_percent = match parse_percentage(cell("discount_percent")) {
            Parsed::Value(v) => Some(v),
            Parsed::Missing => None,
            Parsed::Invalid { raw, reason } => {
                issues.push(ImportIssue::warning(row.number, "Desconto (%)", reason).with_value(raw));
                None
            }
        };
        let contract_date = match parse_date(cell("contract_date")) {
            Parsed::Value(d) => Some(d),
            Parsed::Missing => None,
            Parsed::Invalid { raw, reason } => {
                issues.push(ImportIssue::warning(row.number, "Data do contrato", reason).with_value(raw));
                None
            }
        };

        for issue in issues {
            result.push_issue(issue);
        }

        Some(Staged {
            row_number: row.number,
            raw: table.row_as_json(row),
            record: CreateClientRequest {
                name,
                cpf,
                cnpj,
                email: text("email").map(|e| e.to_lowercase()),
                phone: text("phone"),
                street: text("street"),
                city: text("city"),
                state: text("state").map(|s| s.to_uppercase()),
                postal_code: text("postal_code"),
                installation_id: text("installation_id"),
                plant: text("plant"),
                discount_percent,
                contract_date,
                notes: text("notes"),
            },
        })
    }
}

/// Create-or-update by formatted document, creating the plant on first use.
struct ClientWriter<'a> {
    store: &'a dyn ClientStore,
    tenant_id: &'a str,
}

#[async_trait]
impl RecordWriter<CreateClientRequest> for ClientWriter<'_> {
    async fn write(&self, record: &CreateClientRequest) -> Result<WriteReport, StoreError> {
        let mut plant_created = None;
        if let Some(plant) = record.plant.as_deref() {
            let (plant, created) = self.store.find_or_create_plant(self.tenant_id, plant).await?;
            if created {
                info!("Created plant '{}'", plant.name);
                plant_created = Some(plant.name);
            }
        }

        let outcome = match record.document() {
            Some(doc) => {
                let key = ClientKey::Document(doc.to_string());
                match self.store.search(self.tenant_id, &key).await? {
                    Some(existing) => {
                        self.store.update(existing.id, &record.to_patch()).await?;
                        WriteOutcome::Updated
                    }
                    None => {
                        self.store.create(self.tenant_id, record).await?;
                        WriteOutcome::Created
                    }
                }
            }
            None => {
                self.store.create(self.tenant_id, record).await?;
                WriteOutcome::Created
            }
        };

        let mut report = WriteReport::new(outcome);
        report.plant_created = plant_created;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryClientStore;
    use crate::services::header_resolver::MappingOverrides;
    use crate::services::orchestrator::NoProgress;
    use crate::services::tabular::{read_grid, FileFormat, ReaderOptions};

    const SCENARIO_CSV: &str = "Nome,CPF,Telefone\n\
        Maria Souza,529.982.247-25,(41) 99999-0000\n\
        João Lima,123.456.789-00,(41) 98888-0000\n\
        ,111.444.777-35,(41) 97777-0000\n";

    fn importer(store: &Arc<MemoryClientStore>, policy: DocumentPolicy) -> ClientImporter {
        let settings = ImportSettings {
            document_policy: policy,
            ..Default::default()
        };
        ClientImporter::new(store.clone(), settings)
    }

    fn plan(importer: &ClientImporter, csv: &str) -> ImportPlan {
        let grid = read_grid(csv.as_bytes(), FileFormat::Csv, ReaderOptions::default()).unwrap();
        importer.plan(grid, None).unwrap()
    }

    async fn import(importer: &ClientImporter, csv: &str) -> ImportResult {
        let plan = plan(importer, csv);
        let mapping = plan.proposal.clone().confirm(&MappingOverrides::new()).unwrap();
        importer.run("gd-sul", &plan.table, &mapping, &NoProgress).await
    }

    #[tokio::test]
    async fn test_scenario_warn_policy() {
        let store = Arc::new(MemoryClientStore::new());
        let result = import(&importer(&store, DocumentPolicy::Warn), SCENARIO_CSV).await;

        assert_eq!(result.total, 3);
        assert_eq!(result.success, 2);
        assert_eq!(result.created, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed(), 0);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].row_number, 3);
        assert_eq!(result.warnings[0].original_value.as_deref(), Some("123.456.789-00"));

        let clients = store.clients();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[1].cpf.as_deref(), Some("123.456.789-00"));
    }

    #[tokio::test]
    async fn test_scenario_reject_policy() {
        let store = Arc::new(MemoryClientStore::new());
        let result = import(&importer(&store, DocumentPolicy::Reject), SCENARIO_CSV).await;

        assert_eq!(result.total, 3);
        assert_eq!(result.success, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed(), 1);
        assert_eq!(result.errors[0].row_number, 3);
        assert!(result.errors[0].record.is_some());
        assert_eq!(store.clients().len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_accept_policy() {
        let store = Arc::new(MemoryClientStore::new());
        let result = import(&importer(&store, DocumentPolicy::Accept), SCENARIO_CSV).await;

        assert_eq!(result.success, 2);
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_reimport_updates_by_document() {
        let store = Arc::new(MemoryClientStore::new());
        let importer = importer(&store, DocumentPolicy::Warn);
        import(&importer, "Nome;CPF;Cidade\nMaria;52998224725;Curitiba\n").await;
        let result = import(&importer, "Nome;CPF;Cidade\nMaria Souza;529.982.247-25;Londrina\n").await;

        assert_eq!(result.updated, 1);
        assert_eq!(result.created, 0);
        let clients = store.clients();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "Maria Souza");
        assert_eq!(clients[0].city.as_deref(), Some("Londrina"));
    }

    #[tokio::test]
    async fn test_full_row_normalization_and_plants() {
        let csv = "Razão Social;CPF/CNPJ;E-mail;UF;Usina;Desconto (%);Data do contrato;Instalação\n\
            Padaria Sol;11222333000181;CONTATO@PADARIA.COM;pr;Usina Norte;15,5%;03/04/2024;3001234567\n\
            Maria Souza;52998224725;;sc;usina norte;abc;31/02/2024;3007654321\n";
        let store = Arc::new(MemoryClientStore::new());
        let result = import(&importer(&store, DocumentPolicy::Warn), csv).await;

        assert_eq!(result.success, 2);
        assert_eq!(result.plants_created.len(), 1);
        assert!(result.plants_created.contains("Usina Norte"));
        // bad discount and impossible contract date on row 3
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings.iter().all(|w| w.row_number == 3));

        let clients = store.clients();
        let padaria = &clients[0];
        assert_eq!(padaria.cnpj.as_deref(), Some("11.222.333/0001-81"));
        assert_eq!(padaria.cpf, None);
        assert_eq!(padaria.email.as_deref(), Some("contato@padaria.com"));
        assert_eq!(padaria.state.as_deref(), Some("PR"));
        assert_eq!(padaria.discount_percent, Some(15.5));
        assert_eq!(padaria.contract_date, chrono::NaiveDate::from_ymd_opt(2024, 4, 3));
        assert_eq!(clients[1].cpf.as_deref(), Some("529.982.247-25"));
        assert_eq!(clients[1].discount_percent, None);
        assert_eq!(store.plants().len(), 1);
    }

    #[tokio::test]
    async fn test_combined_document_column_routes_by_kind() {
        let csv = "Nome;CPF;CNPJ;CPF/CNPJ\n\
            Padaria;;11.222.333/0001-81;45.997.418/0001-53\n\
            Maria;;45997418000153;52998224725\n";
        let store = Arc::new(MemoryClientStore::new());
        let result = import(&importer(&store, DocumentPolicy::Warn), csv).await;

        assert_eq!(result.success, 2);
        let clients = store.clients();

        // a second CNPJ never lands in the CPF slot
        assert_eq!(clients[0].cpf, None);
        assert_eq!(clients[0].cnpj.as_deref(), Some("11.222.333/0001-81"));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].row_number, 2);
        assert_eq!(result.warnings[0].original_value.as_deref(), Some("45.997.418/0001-53"));

        assert_eq!(clients[1].cpf.as_deref(), Some("529.982.247-25"));
        assert_eq!(clients[1].cnpj.as_deref(), Some("45.997.418/0001-53"));
    }

    #[test]
    fn test_plan_warns_without_document_column() {
        let store = Arc::new(MemoryClientStore::new());
        let plan = plan(&importer(&store, DocumentPolicy::Warn), "Nome,Telefone\nMaria,123\n");

        assert!(plan.proposal.warnings.iter().any(|w| w.field == "document"));
        // name is mapped, so the mapping itself can still be confirmed
        assert!(plan.proposal.confirm(&MappingOverrides::new()).is_ok());
    }

    #[test]
    fn test_plan_blocks_without_name_column() {
        let store = Arc::new(MemoryClientStore::new());
        let plan = plan(&importer(&store, DocumentPolicy::Warn), "Nome completo do titular,CPF\nMaria,123\n");

        assert!(plan.proposal.confirm(&MappingOverrides::new()).is_err());
    }
}
