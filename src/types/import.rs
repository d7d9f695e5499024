//! Import result types shared by the client-base and invoice flows

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which importer handles a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// Client base (name, CPF/CNPJ, contact, plant)
    Clients,
    /// Utility invoices (installation, amount, due date)
    Invoices,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Clients => "clients",
            ImportKind::Invoices => "invoices",
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a well-shaped CPF/CNPJ that fails its checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DocumentPolicy {
    /// Keep the record, say nothing
    Accept,
    /// Keep the record and add a warning
    #[default]
    Warn,
    /// Drop the record as a row error
    Reject,
}

impl FromStr for DocumentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accept" | "aceitar" => Ok(DocumentPolicy::Accept),
            "warn" | "avisar" => Ok(DocumentPolicy::Warn),
            "reject" | "rejeitar" => Ok(DocumentPolicy::Reject),
            other => Err(format!("unknown document policy '{}'", other)),
        }
    }
}

/// Import issue level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportIssueLevel {
    Warning,
    Error,
}

/// Single import issue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportIssue {
    /// 1-based spreadsheet row
    pub row_number: u32,
    pub level: ImportIssueLevel,
    pub field: String,
    pub message: String,
    pub original_value: Option<String>,
    /// Raw row as header → cell text, for the operator's detail view
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<serde_json::Value>,
}

impl ImportIssue {
    pub fn error(row_number: u32, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row_number,
            level: ImportIssueLevel::Error,
            field: field.into(),
            message: message.into(),
            original_value: None,
            record: None,
        }
    }

    pub fn warning(row_number: u32, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: ImportIssueLevel::Warning,
            ..Self::error(row_number, field, message)
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.original_value = Some(value.into());
        self
    }

    pub fn with_record(mut self, record: serde_json::Value) -> Self {
        self.record = Some(record);
        self
    }
}

/// Installation id without a matching client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundEntry {
    pub row_number: u32,
    pub key: String,
}

/// Progress snapshot handed to a [`ProgressSink`](crate::services::orchestrator::ProgressSink)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub current: u32,
    pub total: u32,
    pub percent: u8,
}

impl ImportProgress {
    pub fn new(current: u32, total: u32) -> Self {
        let percent = if total == 0 {
            100
        } else {
            ((u64::from(current) * 100) / u64::from(total)).min(100) as u8
        };
        Self { current, total, percent }
    }
}

/// Outcome of one import run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub kind: ImportKind,
    /// Data rows read below the header
    pub total: u32,
    /// Rows persisted or recognised as already imported
    pub success: u32,
    pub created: u32,
    pub updated: u32,
    pub duplicates: u32,
    /// Rows silently dropped by the acceptance gate
    pub skipped: u32,
    pub errors: Vec<ImportIssue>,
    pub warnings: Vec<ImportIssue>,
    pub not_found: Vec<NotFoundEntry>,
    pub plants_created: BTreeSet<String>,
}

impl ImportResult {
    pub fn new(kind: ImportKind, total: u32) -> Self {
        Self {
            kind,
            total,
            success: 0,
            created: 0,
            updated: 0,
            duplicates: 0,
            skipped: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            not_found: Vec::new(),
            plants_created: BTreeSet::new(),
        }
    }

    pub fn failed(&self) -> u32 {
        self.errors.len() as u32
    }

    pub fn push_issue(&mut self, issue: ImportIssue) {
        match issue.level {
            ImportIssueLevel::Error => self.errors.push(issue),
            ImportIssueLevel::Warning => self.warnings.push(issue),
        }
    }

    /// Fold the result of another sheet into this one (workbook imports).
    pub fn merge(&mut self, other: ImportResult) {
        self.total += other.total;
        self.success += other.success;
        self.created += other.created;
        self.updated += other.updated;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.not_found.extend(other.not_found);
        self.plants_created.extend(other.plants_created);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(ImportProgress::new(5, 10).percent, 50);
        assert_eq!(ImportProgress::new(1, 3).percent, 33);
        assert_eq!(ImportProgress::new(3, 3).percent, 100);
        assert_eq!(ImportProgress::new(0, 0).percent, 100);
    }

    #[test]
    fn test_push_issue_routes_by_level() {
        let mut result = ImportResult::new(ImportKind::Clients, 2);
        result.push_issue(ImportIssue::error(2, "nome", "Nome ausente"));
        result.push_issue(ImportIssue::warning(3, "cpf", "CPF inválido"));

        assert_eq!(result.failed(), 1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_result_serializes_to_camel_case() {
        let result = ImportResult::new(ImportKind::Invoices, 0);
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("notFound"));
        assert!(json.contains("plantsCreated"));
        assert!(json.contains("\"kind\":\"invoices\""));
    }

    #[test]
    fn test_document_policy_from_str() {
        assert_eq!("warn".parse::<DocumentPolicy>(), Ok(DocumentPolicy::Warn));
        assert_eq!("REJEITAR".parse::<DocumentPolicy>(), Ok(DocumentPolicy::Reject));
        assert!("maybe".parse::<DocumentPolicy>().is_err());
    }

    #[test]
    fn test_merge_accumulates() {
        let mut a = ImportResult::new(ImportKind::Clients, 2);
        a.success = 2;
        let mut b = ImportResult::new(ImportKind::Clients, 3);
        b.success = 1;
        b.plants_created.insert("Usina Norte".to_string());

        a.merge(b);

        assert_eq!(a.total, 5);
        assert_eq!(a.success, 3);
        assert!(a.plants_created.contains("Usina Norte"));
    }
}
