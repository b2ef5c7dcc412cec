//! On-disk user data: engine settings and the recent-projects list

mod recent;

pub use recent::{RecentProjectEntry, RecentProjectsStore, MAX_RECENT_PROJECTS};

use directories::ProjectDirs;
use photomeasure_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: u32 = 1;

/// Overrides the platform data directory
pub const DATA_DIR_ENV: &str = "PHOTOMEASURE_DATA_DIR";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported settings version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsEnvelope {
    version: u32,
    settings: EngineConfig,
}

impl Storage {
    /// Platform data directory, or `PHOTOMEASURE_DATA_DIR` when set
    pub fn from_default_project() -> Result<Self, StorageError> {
        if let Some(root) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(root));
        }

        let dirs = ProjectDirs::from("dev", "Photomeasure", "Photomeasure")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_settings(&self) -> Result<EngineConfig, StorageError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(EngineConfig::default());
        }

        let bytes = fs::read(path)?;
        let envelope: SettingsEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > SETTINGS_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: envelope.version,
                supported: SETTINGS_SCHEMA_VERSION,
            });
        }

        Ok(envelope.settings)
    }

    pub fn save_settings(&self, settings: &EngineConfig) -> Result<(), StorageError> {
        let envelope =
            SettingsEnvelope { version: SETTINGS_SCHEMA_VERSION, settings: settings.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        write_atomically(&self.settings_path(), &bytes)?;
        tracing::debug!(root = %self.root.display(), "settings saved");
        Ok(())
    }

    /// Recent-projects list backed by this data directory
    pub fn recent_projects(&self) -> RecentProjectsStore {
        RecentProjectsStore::open(self.root.join("recent_projects.json"))
    }

    fn settings_path(&self) -> PathBuf {
        self.root.join("settings.json")
    }
}

/// Replace `path` with `bytes` so readers never see a partial file
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        let settings = EngineConfig {
            drag_threshold_px: 7.5,
            autosave_enabled: false,
            history_depth: 20,
            ..EngineConfig::default()
        };

        store.save_settings(&settings).expect("save should succeed");
        let loaded = store.load_settings().expect("load should succeed");

        assert_eq!(loaded, settings);
    }

    #[test]
    fn load_defaults_when_file_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        let loaded = store.load_settings().expect("load should succeed");
        assert_eq!(loaded, EngineConfig::default());
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        fs::write(
            temp.path().join("settings.json"),
            r#"{"version": 1, "settings": {"history_depth": 5}}"#,
        )
        .expect("write should succeed");

        let loaded = store.load_settings().expect("load should succeed");
        assert_eq!(loaded.history_depth, 5);
        assert_eq!(loaded.drag_threshold_px, EngineConfig::default().drag_threshold_px);
    }

    #[test]
    fn newer_settings_version_is_rejected() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        fs::write(temp.path().join("settings.json"), r#"{"version": 9, "settings": {}}"#)
            .expect("write should succeed");

        assert!(matches!(
            store.load_settings(),
            Err(StorageError::UnsupportedVersion { found: 9, supported: 1 })
        ));
    }

    #[test]
    fn corrupt_settings_report_serde_error() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());
        fs::write(temp.path().join("settings.json"), "{not json").expect("write should succeed");

        assert!(matches!(store.load_settings(), Err(StorageError::Serde(_))));
    }
}
