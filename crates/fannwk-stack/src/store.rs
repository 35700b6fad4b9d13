//! Persisted record store.
//!
//! The layer writes two records wholesale: the protocol configuration and the
//! cached statistics block. Each lives in a named slot. Records are JSON so
//! they round-trip exactly across restarts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StoreError;

/// Slot holding [`NwkConfig`](crate::config::NwkConfig).
pub const CONFIG_SLOT: &str = "nwk_config";
/// Slot holding [`StatisticsBlock`](crate::statistics::StatisticsBlock).
pub const STATS_SLOT: &str = "nwk_cached_stats";

/// Named-slot byte storage.
pub trait RecordStore: Send {
    /// Read a slot; `None` if it was never written.
    fn load(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace a slot's contents.
    fn save(&mut self, slot: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Load and parse a record.
pub fn load_record<T: DeserializeOwned>(
    store: &dyn RecordStore,
    slot: &str,
) -> Result<Option<T>, StoreError> {
    store
        .load(slot)?
        .map(|bytes| serde_json::from_slice(&bytes))
        .transpose()
        .map_err(Into::into)
}

/// Serialize and write a record.
pub fn save_record<T: Serialize>(
    store: &mut dyn RecordStore,
    slot: &str,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.save(slot, &bytes)
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// One `<slot>.json` file per record under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) the store directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "record store opened");
        Ok(Self { dir })
    }

    fn path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{slot}.json"))
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path(slot)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, slot: &str, bytes: &[u8]) -> Result<(), StoreError> {
        // Write beside the target then rename, so a crash never leaves a torn record.
        let path = self.path(slot);
        let tmp = self.dir.join(format!("{slot}.json.tmp"));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Volatile store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the slot currently holds a record.
    pub fn contains(&self, slot: &str) -> bool {
        self.records
            .lock()
            .map(|r| r.contains_key(slot))
            .unwrap_or(false)
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, slot: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(records.get(slot).cloned())
    }

    fn save(&mut self, slot: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        records.insert(slot.to_string(), bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NwkConfig, StaticRoute};
    use fannwk_models::ExtensionId;

    fn sample_config() -> NwkConfig {
        NwkConfig {
            head_end_context: 7,
            static_routes: vec![StaticRoute {
                destination: ExtensionId::new([9; 5]),
                hops: vec![ExtensionId::new([1; 5])],
                persist: false,
            }],
        }
    }

    #[test]
    fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path().join("nested")).unwrap();

        assert!(load_record::<NwkConfig>(&store, CONFIG_SLOT).unwrap().is_none());
        save_record(&mut store, CONFIG_SLOT, &sample_config()).unwrap();

        let reopened = JsonFileStore::open(dir.path().join("nested")).unwrap();
        let loaded: NwkConfig = load_record(&reopened, CONFIG_SLOT).unwrap().unwrap();
        assert_eq!(loaded, sample_config());
        assert!(!dir.path().join("nested").join("nwk_config.json.tmp").exists());
    }

    #[test]
    fn file_store_reports_corrupt_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path()).unwrap();
        store.save(CONFIG_SLOT, b"{not json").unwrap();
        assert!(matches!(
            load_record::<NwkConfig>(&store, CONFIG_SLOT),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn memory_store_clones_share_records() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        save_record(&mut writer, STATS_SLOT, &42u32).unwrap();
        assert!(store.contains(STATS_SLOT));
        assert_eq!(load_record::<u32>(&store, STATS_SLOT).unwrap(), Some(42));
    }
}
