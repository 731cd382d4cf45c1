use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::counter::ResetPolicy;

pub const LEDGER_FILE_NAME: &str = "getwalk.db";
pub const BASELINE_FILE_NAME: &str = "previous_step_count.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectorSettings {
    pub ledger_path: PathBuf,
    pub baseline_path: PathBuf,
    pub reset_policy: ResetPolicy,
    pub open_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub busy_timeout_ms: u64,
    pub channel_capacity: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(LEDGER_FILE_NAME),
            baseline_path: PathBuf::from(BASELINE_FILE_NAME),
            reset_policy: ResetPolicy::default(),
            open_timeout_ms: 5_000,
            write_timeout_ms: 2_000,
            busy_timeout_ms: 1_000,
            channel_capacity: 256,
        }
    }
}

impl CollectorSettings {
    /// Defaults with both files placed under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            ledger_path: dir.join(LEDGER_FILE_NAME),
            baseline_path: dir.join(BASELINE_FILE_NAME),
            ..Self::default()
        }
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<CollectorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Falling back to default collector settings ({}): {err}",
                    path.display()
                );
                CollectorSettings::default()
            })
        } else {
            CollectorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn collector(&self) -> CollectorSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update_collector(&self, settings: CollectorSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &CollectorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
