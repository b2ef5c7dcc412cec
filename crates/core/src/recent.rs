//! Recent-projects collaborator interface

use crate::project::ProjectId;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Receives a notification after every successful project save or load
///
/// Implementations own ordering, de-duplication and persistence; failures
/// are theirs to log, never the caller's to handle.
pub trait RecentProjects {
    fn add_recent_project(&mut self, id: ProjectId, name: &str, path: &Path, timestamp: DateTime<Utc>);
}

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecentProjects;

impl RecentProjects for NoRecentProjects {
    fn add_recent_project(&mut self, _: ProjectId, _: &str, _: &Path, _: DateTime<Utc>) {}
}
