use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::modes::CoachMode;

/// Most recent entries kept; older ones are evicted head-first.
pub const HISTORY_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    pub score: u8,
    pub mode: CoachMode,
}

impl HistoryEntry {
    pub fn today(score: u8, mode: CoachMode) -> Self {
        Self {
            date: Utc::now().format("%Y-%m-%d").to_string(),
            score,
            mode,
        }
    }
}

/// Bounded, persisted score trend. One JSON file holds the whole list
/// (array, newest last); every append rewrites it.
#[derive(Debug, Clone)]
pub struct ScoreHistoryStore {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl ScoreHistoryStore {
    /// Reads the persisted list once. Missing or corrupt data yields an
    /// empty list; loading never fails the caller.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = read_entries(&path).unwrap_or_default();
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ordered oldest-first, newest last.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends at the tail, evicts from the head past `HISTORY_CAP`, then
    /// rewrites the persisted representation.
    pub fn append(&mut self, entry: HistoryEntry) -> anyhow::Result<()> {
        self.entries.push(entry);
        while self.entries.len() > HISTORY_CAP {
            self.entries.remove(0);
        }
        self.flush()
    }

    fn flush(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Option<Vec<HistoryEntry>> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
