//! Import job types for JetStream-based async processing

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ImportKind, ImportProgress, ImportResult};
use crate::services::header_resolver::MappingOverrides;

/// Uploaded file carried inside a NATS message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFile {
    /// Original name; its extension selects the reader
    pub file_name: String,
    pub content_base64: String,
}

impl ImportFile {
    pub fn new(file_name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            file_name: file_name.into(),
            content_base64: STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.content_base64.trim())
    }
}

/// Ask for the proposed mapping of a file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    pub kind: ImportKind,
    pub file: ImportFile,
}

/// Import a file with the mapping the operator confirmed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobRequest {
    pub tenant_id: String,
    pub kind: ImportKind,
    pub file: ImportFile,
    /// Operator corrections to the proposed mapping
    #[serde(default)]
    pub overrides: MappingOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub tenant_id: String,
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

/// Status of an import job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImportJobStatus {
    #[serde(rename_all = "camelCase")]
    Queued { position: u32 },
    /// Reading the file and resolving the mapping
    Parsing,
    #[serde(rename_all = "camelCase")]
    Importing { current: u32, total: u32, percent: u8 },
    #[serde(rename_all = "camelCase")]
    Completed {
        result: ImportResult,
        /// Human-readable summary
        report: String,
        duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Failed { error: String },
}

impl From<ImportProgress> for ImportJobStatus {
    fn from(p: ImportProgress) -> Self {
        ImportJobStatus::Importing {
            current: p.current,
            total: p.total,
            percent: p.percent,
        }
    }
}

/// A queued import job in JetStream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedImportJob {
    pub id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub request: ImportJobRequest,
}

impl QueuedImportJob {
    pub fn new(request: ImportJobRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            submitted_at: Utc::now(),
            request,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobStatusUpdate {
    pub job_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: ImportJobStatus,
}

impl ImportJobStatusUpdate {
    pub fn new(job_id: Uuid, status: ImportJobStatus) -> Self {
        Self {
            job_id,
            timestamp: Utc::now(),
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobSubmitResponse {
    pub job_id: Uuid,
    pub kind: ImportKind,
    pub file_name: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::header_resolver::ColumnRef;

    #[test]
    fn test_import_file_base64() {
        let file = ImportFile::new("base.csv", b"Nome;CPF\n");
        assert_eq!(file.content_base64, "Tm9tZTtDUEYK");
        assert_eq!(file.decode().unwrap(), b"Nome;CPF\n");
    }

    #[test]
    fn test_job_request_deserializes_overrides() {
        let json = r#"{
            "tenantId": "gd-sul",
            "kind": "invoices",
            "file": { "fileName": "faturas.xlsx", "contentBase64": "" },
            "overrides": { "amount": "Valor", "status": null }
        }"#;
        let request: ImportJobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.kind, ImportKind::Invoices);
        assert_eq!(request.overrides["amount"], Some(ColumnRef::Header("Valor".into())));
        assert_eq!(request.overrides["status"], None);
    }

    #[test]
    fn test_overrides_default_to_empty() {
        let json = r#"{"tenantId":"t","kind":"clients","file":{"fileName":"a.csv","contentBase64":""}}"#;
        let request: ImportJobRequest = serde_json::from_str(json).unwrap();
        assert!(request.overrides.is_empty());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ImportJobStatus::from(ImportProgress::new(5, 10))).unwrap();
        assert!(json.contains("\"type\":\"importing\""));
        assert!(json.contains("\"percent\":50"));

        let json = serde_json::to_string(&ImportJobStatus::Parsing).unwrap();
        assert_eq!(json, r#"{"type":"parsing"}"#);
    }

    #[test]
    fn test_queued_job_has_fresh_id() {
        let request = ImportJobRequest {
            tenant_id: "gd-sul".into(),
            kind: ImportKind::Clients,
            file: ImportFile::new("a.csv", b""),
            overrides: MappingOverrides::new(),
        };
        assert!(!QueuedImportJob::new(request).id.is_nil());
    }
}
