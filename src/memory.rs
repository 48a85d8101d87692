//! Bounded interaction history.
//!
//! [`InteractionMemory`] keeps the most recent records in memory and writes
//! the whole window through a [`HistoryStore`] after every append. Store
//! failures are logged and otherwise ignored: history is an audit trail, not
//! something a command or answer may fail on.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version written to, and required of, history files.
pub const HISTORY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Command,
    Question,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: InteractionKind,
    pub input: String,
    pub output_summary: String,
    pub succeeded: bool,
}

impl InteractionRecord {
    /// A record stamped now, with `output` cut to `summary_chars` characters.
    pub fn new(
        kind: InteractionKind,
        input: impl Into<String>,
        output: &str,
        succeeded: bool,
        summary_chars: usize,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            input: input.into(),
            output_summary: output.chars().take(summary_chars).collect(),
            succeeded,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("history i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed history: {0}")]
    Format(#[from] serde_json::Error),
    #[error("unsupported history version {0} (expected {expected})", expected = HISTORY_VERSION)]
    UnsupportedVersion(u64),
}

/// Where history lives between runs.
pub trait HistoryStore: Send + Sync {
    fn load(&self) -> Result<Vec<InteractionRecord>, StoreError>;
    fn save(&self, records: &[InteractionRecord]) -> Result<(), StoreError>;
}

#[derive(Deserialize)]
struct StoredHistory {
    version: u64,
    #[serde(default)]
    records: serde_json::Value,
}

#[derive(Serialize)]
struct StoredHistoryRef<'a> {
    version: u32,
    records: &'a [InteractionRecord],
}

/// `{"version": 1, "records": [...]}` in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/<session>.json`, with the session id reduced to file-name-safe characters.
    pub fn for_session(dir: &Path, session: &str) -> Self {
        let name: String = session
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
            .collect();
        let name = if name.is_empty() { "default" } else { name.as_str() };
        Self::new(dir.join(format!("{name}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self) -> Result<Vec<InteractionRecord>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredHistory = serde_json::from_str(&text)?;
        if stored.version != u64::from(HISTORY_VERSION) {
            return Err(StoreError::UnsupportedVersion(stored.version));
        }
        Ok(serde_json::from_value(stored.records)?)
    }

    fn save(&self, records: &[InteractionRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(&StoredHistoryRef {
            version: HISTORY_VERSION,
            records,
        })?;
        // Readers only ever see a complete file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Keeps history for the life of the process only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<InteractionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<InteractionRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// What the last save wrote.
    pub fn saved(&self) -> Vec<InteractionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self) -> Result<Vec<InteractionRecord>, StoreError> {
        Ok(self.saved())
    }

    fn save(&self, records: &[InteractionRecord]) -> Result<(), StoreError> {
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = records.to_vec();
        Ok(())
    }
}

/// FIFO window over the most recent `capacity` interactions.
pub struct InteractionMemory {
    records: Mutex<VecDeque<InteractionRecord>>,
    store: Box<dyn HistoryStore>,
    capacity: usize,
}

impl InteractionMemory {
    /// Load from `store`. A store that cannot be read starts the window empty.
    pub fn load(store: Box<dyn HistoryStore>, capacity: usize) -> Self {
        let mut records: VecDeque<InteractionRecord> = match store.load() {
            Ok(records) => records.into(),
            Err(e) => {
                log::warn!("ignoring unreadable history: {e}");
                VecDeque::new()
            }
        };
        while records.len() > capacity {
            records.pop_front();
        }
        Self {
            records: Mutex::new(records),
            store,
            capacity,
        }
    }

    /// Append, evicting the oldest records past capacity, then persist.
    ///
    /// The lock is held across the save so concurrent appends are written in order.
    pub fn append(&self, record: InteractionRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
        if let Err(e) = self.store.save(records.make_contiguous()) {
            log::warn!("failed to save history: {e}");
        }
    }

    /// Oldest first.
    pub fn records(&self) -> Vec<InteractionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(n: usize) -> InteractionRecord {
        InteractionRecord::new(InteractionKind::Command, format!("echo {n}"), &n.to_string(), true, 200)
    }

    struct FailingStore;

    impl HistoryStore for FailingStore {
        fn load(&self) -> Result<Vec<InteractionRecord>, StoreError> {
            Err(io::Error::other("disk on fire").into())
        }
        fn save(&self, _: &[InteractionRecord]) -> Result<(), StoreError> {
            Err(io::Error::other("disk on fire").into())
        }
    }

    #[test]
    fn summary_truncated_by_chars() {
        let r = InteractionRecord::new(InteractionKind::Question, "q", "héllo wörld", true, 4);
        assert_eq!(r.output_summary, "héll");
    }

    #[test]
    fn fifo_eviction() {
        let memory = InteractionMemory::load(Box::new(MemoryStore::new()), 20);
        for n in 0..25 {
            memory.append(record(n));
        }
        let records = memory.records();
        assert_eq!(records.len(), 20);
        assert_eq!(records[0].input, "echo 5");
        assert_eq!(records[19].input, "echo 24");
    }

    #[test]
    fn append_persists_window() {
        let store = Arc::new(MemoryStore::new());
        struct Shared(Arc<MemoryStore>);
        impl HistoryStore for Shared {
            fn load(&self) -> Result<Vec<InteractionRecord>, StoreError> {
                self.0.load()
            }
            fn save(&self, records: &[InteractionRecord]) -> Result<(), StoreError> {
                self.0.save(records)
            }
        }
        let memory = InteractionMemory::load(Box::new(Shared(store.clone())), 2);
        for n in 0..3 {
            memory.append(record(n));
        }
        let saved: Vec<String> = store.saved().into_iter().map(|r| r.input).collect();
        assert_eq!(saved, ["echo 1", "echo 2"]);
    }

    #[test]
    fn load_trims_to_capacity() {
        let store = MemoryStore::with_records((0..5).map(record).collect());
        let memory = InteractionMemory::load(Box::new(store), 3);
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.records()[0].input, "echo 2");
    }

    #[test]
    fn store_failures_are_swallowed() {
        let memory = InteractionMemory::load(Box::new(FailingStore), 20);
        assert!(memory.is_empty());
        memory.append(record(1));
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::for_session(dir.path(), "work");
        assert_eq!(store.load().unwrap(), Vec::new());

        let records = vec![record(1), record(2)];
        store.save(&records).unwrap();
        assert_eq!(store.path(), dir.path().join("work.json"));
        assert_eq!(store.load().unwrap(), records);
    }

    #[test]
    fn json_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/deeper/history.json"));
        store.save(&[record(1)]).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[test]
    fn json_store_rejects_other_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, r#"{"version": 2, "records": [{"whatever": true}]}"#).unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion(2)), "{err}");
    }

    #[test]
    fn json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "\u{80}\u{5}pickle").unwrap();
        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Format(_)), "{err}");

        let memory = InteractionMemory::load(Box::new(JsonFileStore::new(&path)), 20);
        assert!(memory.is_empty());
    }

    #[test]
    fn session_name_sanitized() {
        let store = JsonFileStore::for_session(Path::new("/tmp/h"), "../../etc/passwd");
        assert_eq!(store.path(), Path::new("/tmp/h/etcpasswd.json"));
        let store = JsonFileStore::for_session(Path::new("/tmp/h"), "///");
        assert_eq!(store.path(), Path::new("/tmp/h/default.json"));
    }
}
