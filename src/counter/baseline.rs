//! Durable slot for the last raw counter value the collector has seen.
//!
//! Lives outside the ledger so a restarted process can compute its first delta
//! against the reading taken before the restart.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Baseline {
    #[serde(rename = "previousStepCount")]
    pub last_cumulative_count: u64,
}

impl Baseline {
    pub fn new(last_cumulative_count: u64) -> Self {
        Self {
            last_cumulative_count,
        }
    }
}

/// Key-value slot holding at most one [`Baseline`].
pub trait BaselineStore: Send + Sync {
    fn load(&self) -> Result<Option<Baseline>>;
    fn store(&self, baseline: Baseline) -> Result<()>;
}

/// JSON file store: `{"previousStepCount": N}`, rewritten atomically.
pub struct FileBaselineStore {
    path: PathBuf,
    cached: RwLock<Option<Baseline>>,
}

impl FileBaselineStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let cached = read_baseline(&path)?;
        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn persist(&self, baseline: &Baseline) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create baseline directory {}", parent.display())
                })?;
            }
        }

        let serialized = serde_json::to_string(baseline)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("Failed to write baseline to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace baseline at {}", self.path.display()))
    }
}

fn read_baseline(path: &std::path::Path) -> Result<Option<Baseline>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read baseline from {}", path.display()))?;
    match serde_json::from_str::<Baseline>(&contents) {
        Ok(baseline) => Ok(Some(baseline)),
        Err(err) => {
            // Same as a fresh install: the next reading re-establishes the zero point.
            log::warn!(
                "Ignoring unreadable baseline at {}: {err}",
                path.display()
            );
            Ok(None)
        }
    }
}

impl BaselineStore for FileBaselineStore {
    fn load(&self) -> Result<Option<Baseline>> {
        let guard = self
            .cached
            .read()
            .map_err(|_| anyhow::anyhow!("baseline cache lock poisoned"))?;
        Ok(*guard)
    }

    fn store(&self, baseline: Baseline) -> Result<()> {
        let mut guard = self
            .cached
            .write()
            .map_err(|_| anyhow::anyhow!("baseline cache lock poisoned"))?;
        self.persist(&baseline)?;
        *guard = Some(baseline);
        Ok(())
    }
}

/// In-process store, for embedders without a filesystem slot and for tests.
#[derive(Default)]
pub struct MemoryBaselineStore {
    slot: RwLock<Option<Baseline>>,
}

impl MemoryBaselineStore {
    pub fn new(initial: Option<Baseline>) -> Self {
        Self {
            slot: RwLock::new(initial),
        }
    }
}

impl BaselineStore for MemoryBaselineStore {
    fn load(&self) -> Result<Option<Baseline>> {
        let guard = self
            .slot
            .read()
            .map_err(|_| anyhow::anyhow!("baseline slot lock poisoned"))?;
        Ok(*guard)
    }

    fn store(&self, baseline: Baseline) -> Result<()> {
        let mut guard = self
            .slot
            .write()
            .map_err(|_| anyhow::anyhow!("baseline slot lock poisoned"))?;
        *guard = Some(baseline);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_no_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBaselineStore::new(dir.path().join("baseline.json")).unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("baseline.json");

        FileBaselineStore::new(path.clone())
            .unwrap()
            .store(Baseline::new(4_321))
            .unwrap();

        let reopened = FileBaselineStore::new(path.clone()).unwrap();
        assert_eq!(reopened.load().unwrap(), Some(Baseline::new(4_321)));

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"{"previousStepCount":4321}"#);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        fs::write(&path, "{\"previousStep").unwrap();

        let store = FileBaselineStore::new(path).unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryBaselineStore::default();
        store.store(Baseline::new(1)).unwrap();
        store.store(Baseline::new(2)).unwrap();
        assert_eq!(store.load().unwrap(), Some(Baseline::new(2)));
    }
}
