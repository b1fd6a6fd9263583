//! Data types for ingestion checkpoints and resumable run status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Per-file progress marker inside an [`IngestionCheckpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Extracted,
    Failed,
    Skipped,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileStatus::Pending => "pending",
            FileStatus::Extracted => "extracted",
            FileStatus::Failed => "failed",
            FileStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Resumable record of which files in a repository scan have been processed.
///
/// Non-source files are recorded as [`FileStatus::Skipped`] at creation time
/// and never revisited by `retry_failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionCheckpoint {
    pub checkpoint_id: Uuid,
    pub files: HashMap<String, FileStatus>,
}

impl IngestionCheckpoint {
    pub fn new() -> Self {
        Self {
            checkpoint_id: Uuid::new_v4(),
            files: HashMap::new(),
        }
    }

    /// Seed a fresh checkpoint from a set of discovered paths, marking
    /// `is_source` false entries as skipped rather than pending.
    pub fn seed<I, F>(paths: I, is_source: F) -> Self
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> bool,
    {
        let mut checkpoint = Self::new();
        for path in paths {
            let status = if is_source(&path) {
                FileStatus::Pending
            } else {
                FileStatus::Skipped
            };
            checkpoint.files.insert(path, status);
        }
        checkpoint
    }

    pub fn mark(&mut self, path: &str, status: FileStatus) {
        self.files.insert(path.to_string(), status);
    }

    pub fn status(&self, path: &str) -> Option<FileStatus> {
        self.files.get(path).copied()
    }

    /// Reset every `Failed` entry back to `Pending` so the driver retries it.
    pub fn retry_failed(&mut self) {
        for status in self.files.values_mut() {
            if *status == FileStatus::Failed {
                *status = FileStatus::Pending;
            }
        }
    }

    pub fn pending_paths(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|(_, s)| **s == FileStatus::Pending)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Terminal iff no file remains `Pending`.
    pub fn all_done(&self) -> bool {
        !self.files.values().any(|s| *s == FileStatus::Pending)
    }

    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut dict: HashMap<String, serde_json::Value> = self
            .files
            .iter()
            .map(|(p, s)| (p.clone(), serde_json::Value::String(s.to_string())))
            .collect();
        dict.insert(
            "__checkpoint_id__".to_string(),
            serde_json::Value::String(self.checkpoint_id.to_string()),
        );
        dict
    }

    pub fn from_dict(mut dict: HashMap<String, serde_json::Value>) -> Result<Self, String> {
        let checkpoint_id = dict
            .remove("__checkpoint_id__")
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .ok_or_else(|| "missing __checkpoint_id__".to_string())?;
        let checkpoint_id =
            Uuid::parse_str(&checkpoint_id).map_err(|e| format!("invalid checkpoint id: {e}"))?;

        let mut files = HashMap::with_capacity(dict.len());
        for (path, value) in dict {
            let raw = value
                .as_str()
                .ok_or_else(|| format!("non-string status for {path}"))?;
            let status = match raw {
                "pending" => FileStatus::Pending,
                "extracted" => FileStatus::Extracted,
                "failed" => FileStatus::Failed,
                "skipped" => FileStatus::Skipped,
                other => return Err(format!("unknown status {other} for {path}")),
            };
            files.insert(path, status);
        }
        Ok(Self {
            checkpoint_id,
            files,
        })
    }
}

impl Default for IngestionCheckpoint {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of one ingestion run, addressed by `thread_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionStatus {
    pub thread_id: String,
    pub state: RunState,
    pub total_files: usize,
    pub processed_files: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestionStatus {
    pub fn new(thread_id: impl Into<String>, total_files: usize) -> Self {
        Self {
            thread_id: thread_id.into(),
            state: RunState::Running,
            total_files,
            processed_files: 0,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// A run can be resumed from its checkpoint iff it never reached a clean
    /// completion.
    pub fn resumable(&self) -> bool {
        matches!(self.state, RunState::Running | RunState::Failed)
    }

    pub fn complete(&mut self) {
        self.state = RunState::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.state = RunState::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_id_and_statuses() {
        let mut cp = IngestionCheckpoint::new();
        cp.mark("a.rs", FileStatus::Extracted);
        cp.mark("readme.md", FileStatus::Skipped);
        let dict = cp.to_dict();
        let restored = IngestionCheckpoint::from_dict(dict).unwrap();
        assert_eq!(restored.checkpoint_id, cp.checkpoint_id);
        assert_eq!(restored.status("a.rs"), Some(FileStatus::Extracted));
        assert_eq!(restored.status("readme.md"), Some(FileStatus::Skipped));
    }

    #[test]
    fn retry_failed_then_extract_marks_done() {
        let mut cp = IngestionCheckpoint::new();
        cp.mark("a.rs", FileStatus::Failed);
        cp.retry_failed();
        assert_eq!(cp.status("a.rs"), Some(FileStatus::Pending));
        cp.mark("a.rs", FileStatus::Extracted);
        assert!(cp.all_done());
    }

    #[test]
    fn skipped_files_are_not_touched_by_retry() {
        let mut cp = IngestionCheckpoint::new();
        cp.mark("readme.md", FileStatus::Skipped);
        cp.retry_failed();
        assert_eq!(cp.status("readme.md"), Some(FileStatus::Skipped));
        assert!(cp.all_done());
    }
}
