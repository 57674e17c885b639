//! History of committed merges
//!
//! Every commit that changed a destination is recorded together with the
//! backup it produced, so the latest merge into a file can be rolled back.

use crate::backup::{restore_backup, BackupHandle};
use crate::error::{Error, Result};
use crate::merger::MergeReport;
use crate::schema::SchemaKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the history inside the backup folder
pub const HISTORY_FILE: &str = "history.json";

/// A record of one committed merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the merge was committed
    pub timestamp: DateTime<Utc>,
    pub mission: String,
    pub kind: SchemaKind,
    /// File that was written
    pub destination: PathBuf,
    /// Previous contents; `None` when the destination was created
    pub backup: Option<PathBuf>,
    pub added: Vec<String>,
    pub updated: Vec<String>,
}

impl HistoryEntry {
    /// Build an entry from a successful commit
    pub fn from_commit(
        mission: &str,
        kind: SchemaKind,
        handle: &BackupHandle,
        report: &MergeReport,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            mission: mission.to_string(),
            kind,
            destination: handle.destination.clone(),
            backup: handle.backup.clone(),
            added: report.added().into_iter().map(String::from).collect(),
            updated: report.updated().into_iter().map(String::from).collect(),
        }
    }
}

/// History file containing all committed merges
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFile {
    /// Entries grouped by mission, oldest first
    pub entries: BTreeMap<String, Vec<HistoryEntry>>,
}

impl HistoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load history from a file, or create empty if not exists
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save history, creating the parent directory if needed
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn add_entry(&mut self, entry: HistoryEntry) {
        self.entries
            .entry(entry.mission.clone())
            .or_default()
            .push(entry);
    }

    /// All entries of a mission, oldest first
    pub fn entries_for(&self, mission: &str) -> &[HistoryEntry] {
        self.entries.get(mission).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Latest entry for one destination of a mission
    pub fn last_entry_for(&self, mission: &str, kind: SchemaKind) -> Option<&HistoryEntry> {
        self.entries_for(mission).iter().rev().find(|e| e.kind == kind)
    }

    /// Remove and return the latest entry for one destination of a mission
    pub fn pop_last_entry_for(&mut self, mission: &str, kind: SchemaKind) -> Option<HistoryEntry> {
        let entries = self.entries.get_mut(mission)?;
        let idx = entries.iter().rposition(|e| e.kind == kind)?;
        let entry = entries.remove(idx);
        if entries.is_empty() {
            self.entries.remove(mission);
        }
        Some(entry)
    }

    /// Missions that have history
    pub fn missions(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn total_entries(&self) -> usize {
        self.entries.values().map(|v| v.len()).sum()
    }
}

/// Undo the latest merge into one destination of a mission.
///
/// The destination gets its backup back; a destination that the merge
/// created is removed. The entry is only dropped from the history once the
/// files are restored.
pub fn restore_last(history: &mut HistoryFile, mission: &str, kind: SchemaKind) -> Result<HistoryEntry> {
    let entry = history
        .last_entry_for(mission, kind)
        .cloned()
        .ok_or_else(|| Error::NoHistory {
            mission: mission.to_string(),
            kind,
        })?;

    match &entry.backup {
        Some(backup) => restore_backup(backup, &entry.destination)?,
        None => {
            if entry.destination.exists() {
                fs::remove_file(&entry.destination)?;
            }
            tracing::info!(destination = %entry.destination.display(), "removed created destination");
        }
    }

    history.pop_last_entry_for(mission, kind);
    Ok(entry)
}
