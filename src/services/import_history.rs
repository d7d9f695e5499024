//! Import history
//!
//! Keeps the most recent import runs in memory, newest first. One instance is
//! built at startup and shared by whoever records or lists runs.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::MAX_HISTORY_SIZE;
use crate::types::{ImportKind, ImportResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub kind: ImportKind,
    pub file_name: String,
    pub status: RunStatus,
    pub submitted_at: DateTime<Utc>,
    /// When the worker picked the job up
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ImportResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryResponse {
    pub runs: Vec<ImportHistoryEntry>,
    pub total: usize,
}

/// Identity of a run being recorded
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub id: Uuid,
    pub tenant_id: String,
    pub kind: ImportKind,
    pub file_name: String,
    pub submitted_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
}

pub struct ImportHistory {
    entries: RwLock<VecDeque<ImportHistoryEntry>>,
    capacity: usize,
}

impl Default for ImportHistory {
    fn default() -> Self {
        Self::new(MAX_HISTORY_SIZE)
    }
}

impl ImportHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record_completed(&self, run: RunInfo, result: ImportResult) {
        self.push(run, RunStatus::Completed, None, Some(result));
    }

    pub fn record_failed(&self, run: RunInfo, error: impl Into<String>) {
        self.push(run, RunStatus::Failed, Some(error.into()), None);
    }

    fn push(&self, run: RunInfo, status: RunStatus, error: Option<String>, result: Option<ImportResult>) {
        let completed_at = Utc::now();
        let entry = ImportHistoryEntry {
            id: run.id,
            tenant_id: run.tenant_id,
            kind: run.kind,
            file_name: run.file_name,
            status,
            submitted_at: run.submitted_at,
            started_at: run.started_at,
            completed_at,
            duration_ms: (completed_at - run.started_at).num_milliseconds().max(0) as u64,
            error,
            result,
        };

        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_back();
        }
        entries.push_front(entry);
    }

    /// Newest runs of one tenant.
    pub fn recent_for_tenant(&self, tenant_id: &str, limit: usize) -> ImportHistoryResponse {
        let entries = self.entries.read();
        let runs: Vec<ImportHistoryEntry> = entries
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect();
        let total = runs.len();
        ImportHistoryResponse { runs, total }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(tenant: &str) -> RunInfo {
        RunInfo {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            kind: ImportKind::Clients,
            file_name: "base.csv".to_string(),
            submitted_at: Utc::now(),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_newest_first_and_capacity() {
        let history = ImportHistory::new(3);
        let mut ids = Vec::new();
        for _ in 0..5 {
            let info = run("gd-sul");
            ids.push(info.id);
            history.record_completed(info, ImportResult::new(ImportKind::Clients, 0));
        }

        assert_eq!(history.len(), 3);
        let recent = history.recent_for_tenant("gd-sul", 10);
        assert_eq!(recent.runs[0].id, ids[4]);
        assert_eq!(recent.runs[2].id, ids[2]);
    }

    #[test]
    fn test_tenant_filter_and_failed_runs() {
        let history = ImportHistory::default();
        history.record_completed(run("gd-sul"), ImportResult::new(ImportKind::Clients, 1));
        history.record_failed(run("gd-norte"), "Falha ao ler planilha");

        let norte = history.recent_for_tenant("gd-norte", 10);
        assert_eq!(norte.total, 1);
        assert_eq!(norte.runs[0].status, RunStatus::Failed);
        assert_eq!(norte.runs[0].error.as_deref(), Some("Falha ao ler planilha"));
        assert!(norte.runs[0].result.is_none());
    }

    #[test]
    fn test_duration_excludes_queue_wait() {
        let history = ImportHistory::default();
        let mut info = run("gd-sul");
        info.submitted_at = Utc::now() - chrono::Duration::hours(1);
        history.record_completed(info, ImportResult::new(ImportKind::Clients, 0));

        let entry = &history.recent_for_tenant("gd-sul", 1).runs[0];
        assert!(entry.duration_ms < 60_000);
        assert!(entry.submitted_at < entry.started_at);
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let history = ImportHistory::default();
        history.record_failed(run("gd-sul"), "x");
        let json = serde_json::to_string(&history.recent_for_tenant("gd-sul", 1)).unwrap();
        assert!(json.contains("fileName"));
        assert!(json.contains("\"status\":\"failed\""));
        assert!(!json.contains("\"result\""));
    }
}
