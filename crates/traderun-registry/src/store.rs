//! Snapshot persistence for the registries.
//!
//! A [`Store`] loads and saves the three registry snapshots as whole
//! values; every save is a full rewrite and the last writer wins. Two
//! implementations ship here:
//!
//! - [`JsonFileStore`] -- one pretty-printed JSON file per snapshot under a
//!   directory (`locations.json`, `storage.json`, `cooldowns.json`)
//! - [`MemoryStore`] -- in-process copies, for tests and the simulator

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cooldown::CooldownSnapshot;
use crate::error::StoreError;
use crate::location::LocationSnapshot;
use crate::storage::StorageSnapshot;

/// File name of the location snapshot.
pub const LOCATIONS_FILE: &str = "locations.json";

/// File name of the storage snapshot.
pub const STORAGE_FILE: &str = "storage.json";

/// File name of the cooldown snapshot.
pub const COOLDOWNS_FILE: &str = "cooldowns.json";

/// Keyed load/save of the registry snapshots.
///
/// A snapshot that has never been saved loads as its empty default.
pub trait Store {
    /// Load the location registry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the snapshot exists but cannot be read.
    fn load_locations(&self) -> Result<LocationSnapshot, StoreError>;

    /// Replace the saved location registry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the snapshot cannot be written.
    fn save_locations(&mut self, snapshot: &LocationSnapshot) -> Result<(), StoreError>;

    /// Load the storage memory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the snapshot exists but cannot be read.
    fn load_storage(&self) -> Result<StorageSnapshot, StoreError>;

    /// Replace the saved storage memory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the snapshot cannot be written.
    fn save_storage(&mut self, snapshot: &StorageSnapshot) -> Result<(), StoreError>;

    /// Load the cooldowns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the snapshot exists but cannot be read.
    fn load_cooldowns(&self) -> Result<CooldownSnapshot, StoreError>;

    /// Replace the saved cooldowns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the snapshot cannot be written.
    fn save_cooldowns(&mut self, snapshot: &CooldownSnapshot) -> Result<(), StoreError>;
}

// =========================================================================
// JSON files
// =========================================================================

/// Snapshots stored as JSON files in one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// A store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the snapshot files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T, StoreError> {
        let path = self.dir.join(file);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No snapshot yet");
                return Ok(T::default());
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(serde_json::from_str(&text)?)
    }

    fn write<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.dir.join(file);
        let text = serde_json::to_string_pretty(value)?;
        fs::write(&path, text).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Snapshot saved");
        Ok(())
    }
}

impl Store for JsonFileStore {
    fn load_locations(&self) -> Result<LocationSnapshot, StoreError> {
        self.read(LOCATIONS_FILE)
    }

    fn save_locations(&mut self, snapshot: &LocationSnapshot) -> Result<(), StoreError> {
        self.write(LOCATIONS_FILE, snapshot)
    }

    fn load_storage(&self) -> Result<StorageSnapshot, StoreError> {
        self.read(STORAGE_FILE)
    }

    fn save_storage(&mut self, snapshot: &StorageSnapshot) -> Result<(), StoreError> {
        self.write(STORAGE_FILE, snapshot)
    }

    fn load_cooldowns(&self) -> Result<CooldownSnapshot, StoreError> {
        self.read(COOLDOWNS_FILE)
    }

    fn save_cooldowns(&mut self, snapshot: &CooldownSnapshot) -> Result<(), StoreError> {
        self.write(COOLDOWNS_FILE, snapshot)
    }
}

// =========================================================================
// In memory
// =========================================================================

/// Snapshots kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Last saved location snapshot.
    pub locations: LocationSnapshot,
    /// Last saved storage snapshot.
    pub storage: StorageSnapshot,
    /// Last saved cooldown snapshot.
    pub cooldowns: CooldownSnapshot,
    /// Number of saves of any kind.
    pub saves: u64,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load_locations(&self) -> Result<LocationSnapshot, StoreError> {
        Ok(self.locations.clone())
    }

    fn save_locations(&mut self, snapshot: &LocationSnapshot) -> Result<(), StoreError> {
        self.locations = snapshot.clone();
        self.saves = self.saves.saturating_add(1);
        Ok(())
    }

    fn load_storage(&self) -> Result<StorageSnapshot, StoreError> {
        Ok(self.storage.clone())
    }

    fn save_storage(&mut self, snapshot: &StorageSnapshot) -> Result<(), StoreError> {
        self.storage = snapshot.clone();
        self.saves = self.saves.saturating_add(1);
        Ok(())
    }

    fn load_cooldowns(&self) -> Result<CooldownSnapshot, StoreError> {
        Ok(self.cooldowns.clone())
    }

    fn save_cooldowns(&mut self, snapshot: &CooldownSnapshot) -> Result<(), StoreError> {
        self.cooldowns = snapshot.clone();
        self.saves = self.saves.saturating_add(1);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use traderun_types::{ClusterAnchor, Location};

    use super::*;

    #[test]
    fn memory_store_counts_saves() {
        let mut store = MemoryStore::new();
        let snapshot = LocationSnapshot {
            locations: vec![Location::new(64, ClusterAnchor::default())],
        };
        store.save_locations(&snapshot).unwrap();
        store.save_cooldowns(&CooldownSnapshot::default()).unwrap();
        assert_eq!(store.saves, 2);
        assert_eq!(store.load_locations().unwrap(), snapshot);
    }
}
