use std::{
    fs, io,
    path::{Path, PathBuf},
};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Status;

/// Counts for one pick-up date. Every field is optional on read; a fresh
/// snapshot starts with empty records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<CompactString>,
    #[serde(rename = "CONFIRMED", default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<CompactString>,
    #[serde(rename = "ACKNOWLEDGED", default, skip_serializing_if = "Option::is_none")]
    pub acknowledged: Option<CompactString>,
    #[serde(rename = "PACKED", default, skip_serializing_if = "Option::is_none")]
    pub packed: Option<CompactString>,
    #[serde(rename = "PICKED", default, skip_serializing_if = "Option::is_none")]
    pub picked: Option<CompactString>,
}

impl DateRecord {
    pub fn for_date(date: impl Into<CompactString>) -> Self {
        Self {
            date: Some(date.into()),
            ..Self::default()
        }
    }

    pub fn get(&self, status: Status) -> Option<&str> {
        self.slot(status).as_deref()
    }

    pub fn set(&mut self, status: Status, count: CompactString) {
        *self.slot_mut(status) = Some(count);
    }

    const fn slot(&self, status: Status) -> &Option<CompactString> {
        match status {
            Status::Confirmed => &self.confirmed,
            Status::Acknowledged => &self.acknowledged,
            Status::Packed => &self.packed,
            Status::Picked => &self.picked,
        }
    }

    const fn slot_mut(&mut self, status: Status) -> &mut Option<CompactString> {
        match status {
            Status::Confirmed => &mut self.confirmed,
            Status::Acknowledged => &mut self.acknowledged,
            Status::Packed => &mut self.packed,
            Status::Picked => &mut self.picked,
        }
    }
}

/// The single record handed from the scrape loop to the dashboard.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub today: DateRecord,
    #[serde(default)]
    pub tomorrow: DateRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// Bumped on every write, so equal values mean the file did not change.
    #[serde(default)]
    pub seq: u64,
    /// Keys this program does not know about; carried through every write.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What one finished cycle contributes to the snapshot.
#[derive(Clone, Debug)]
pub struct CycleUpdate {
    pub today: DateRecord,
    pub tomorrow: DateRecord,
    pub status_msg: String,
    pub last_updated: String,
}

impl Snapshot {
    pub fn merge(&mut self, update: CycleUpdate) {
        self.today = update.today;
        self.tomorrow = update.tomorrow;
        self.status_msg = Some(update.status_msg);
        self.last_updated = Some(update.last_updated);
        self.seq += 1;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot io: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been written yet.
    pub fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Reader-side load: anything unreadable degrades to "no data yet".
    pub fn load_or_default(&self) -> Snapshot {
        match self.load() {
            Ok(snapshot) => snapshot.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(target: "store", "\x1b[33munreadable snapshot\x1b[0m {}: {e}", self.path.display());
                Snapshot::default()
            }
        }
    }

    /// Read-merge-write of one cycle's results.
    pub fn commit(&self, update: CycleUpdate) -> Result<Snapshot, StoreError> {
        let mut snapshot = self.load_or_default();
        snapshot.merge(update);
        self.save(&snapshot)?;
        tracing::info!(target: "store", "\x1b[36mwrote snapshot #{}\x1b[0m to {}", snapshot.seq, self.path.display());
        Ok(snapshot)
    }

    /// Writes a sibling temp file and renames it over the target so readers
    /// only ever see a complete document.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(snapshot)?;
        fs::write(&tmp, text)?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}
