//! Persistent recent-projects list

use crate::{write_atomically, StorageError};
use chrono::{DateTime, Utc};
use photomeasure_core::{ProjectId, RecentProjects};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Entries kept after every insertion
pub const MAX_RECENT_PROJECTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentProjectEntry {
    pub project_id: ProjectId,
    pub name: String,
    pub path: PathBuf,
    pub last_opened: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecentFile {
    #[serde(default)]
    projects: Vec<RecentProjectEntry>,
}

/// Most-recent-first list, de-duplicated by path
#[derive(Debug, Clone)]
pub struct RecentProjectsStore {
    path: PathBuf,
    entries: Vec<RecentProjectEntry>,
}

impl RecentProjectsStore {
    /// Load the list at `path`; a missing or unreadable file starts empty
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match Self::read(&path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "discarding unreadable recent projects");
                Vec::new()
            }
        };
        Self { path, entries }
    }

    fn read(path: &Path) -> Result<Vec<RecentProjectEntry>, StorageError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(path)?;
        let mut file: RecentFile = serde_json::from_slice(&bytes)?;
        file.projects.truncate(MAX_RECENT_PROJECTS);
        Ok(file.projects)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[RecentProjectEntry] {
        &self.entries
    }

    /// Move or insert an entry at the front, without persisting
    pub fn record(&mut self, entry: RecentProjectEntry) {
        self.entries.retain(|e| e.path != entry.path);
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_RECENT_PROJECTS);
    }

    /// Forget every entry whose project file no longer exists
    pub fn prune_missing(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.path.exists());
        before - self.entries.len()
    }

    pub fn save(&self) -> Result<(), StorageError> {
        let file = RecentFile { projects: self.entries.clone() };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomically(&self.path, &bytes)?;
        Ok(())
    }
}

impl RecentProjects for RecentProjectsStore {
    fn add_recent_project(&mut self, id: ProjectId, name: &str, path: &Path, timestamp: DateTime<Utc>) {
        self.record(RecentProjectEntry {
            project_id: id,
            name: name.to_string(),
            path: path.to_path_buf(),
            last_opened: timestamp,
        });
        if let Err(err) = self.save() {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to persist recent projects");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn most_recent_first_and_deduplicated() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut store = RecentProjectsStore::open(temp.path().join("recent.json"));
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();

        store.add_recent_project(a, "a", Path::new("/p/a.pmproj"), at(0));
        store.add_recent_project(b, "b", Path::new("/p/b.pmproj"), at(1));
        store.add_recent_project(a, "a", Path::new("/p/a.pmproj"), at(2));

        let names: Vec<_> = store.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(store.entries()[0].last_opened, at(2));
    }

    #[test]
    fn capped_at_ten() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let mut store = RecentProjectsStore::open(temp.path().join("recent.json"));
        for i in 0..15u32 {
            let path = PathBuf::from(format!("/p/{i}.pmproj"));
            store.add_recent_project(uuid::Uuid::new_v4(), &i.to_string(), &path, at(i));
        }

        assert_eq!(store.entries().len(), MAX_RECENT_PROJECTS);
        assert_eq!(store.entries()[0].name, "14");
        assert_eq!(store.entries()[9].name, "5");
    }

    #[test]
    fn persisted_between_opens() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("nested").join("recent.json");
        let id = uuid::Uuid::new_v4();

        let mut store = RecentProjectsStore::open(&path);
        store.add_recent_project(id, "site", Path::new("/p/site.pmproj"), at(3));

        let reopened = RecentProjectsStore::open(&path);
        assert_eq!(reopened.entries(), store.entries());
        assert_eq!(reopened.entries()[0].project_id, id);
    }

    #[test]
    fn unreadable_file_starts_empty() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("recent.json");
        fs::write(&path, "[[[").expect("write should succeed");

        let store = RecentProjectsStore::open(&path);
        assert!(store.entries().is_empty());
    }

    #[test]
    fn prune_drops_missing_projects() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let existing = temp.path().join("kept.pmproj");
        fs::write(&existing, b"x").expect("write should succeed");

        let mut store = RecentProjectsStore::open(temp.path().join("recent.json"));
        store.record(RecentProjectEntry {
            project_id: uuid::Uuid::new_v4(),
            name: "gone".into(),
            path: temp.path().join("gone.pmproj"),
            last_opened: at(0),
        });
        store.record(RecentProjectEntry {
            project_id: uuid::Uuid::new_v4(),
            name: "kept".into(),
            path: existing,
            last_opened: at(1),
        });

        assert_eq!(store.prune_missing(), 1);
        assert_eq!(store.entries()[0].name, "kept");
    }
}
