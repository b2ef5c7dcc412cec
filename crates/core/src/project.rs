//! Project state and the persisted project package
//!
//! [`ProjectState`] is the live, editable part of an open project (image
//! reference, measurements, grid). [`ProjectPackage`] is the transient
//! projection built at save time and produced by a load.

use crate::collection::MeasurementCollection;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Current project file format version
///
/// Version 1 files lack the current image size, fit mode, original file
/// name, grid spacing, guide lines and measurement styles.
pub const FORMAT_VERSION: u32 = 2;

/// Default overlay grid spacing in pixels
pub const DEFAULT_GRID_SPACING: f64 = 50.0;

/// Unique identifier for projects
pub type ProjectId = uuid::Uuid;

/// Pixel dimensions of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Area in square pixels
    pub fn area(&self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }
}

/// Reference to an encoded image on disk
///
/// The engine never holds pixel buffers; image edits produce new files and
/// swap references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub path: PathBuf,
    pub size: ImageSize,
}

impl ImageRef {
    pub fn new(path: impl Into<PathBuf>, size: ImageSize) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// File name component of the path, if any
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// How the image is fitted into the viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageFitMode {
    /// Scale to fit entirely inside the viewport
    #[default]
    Fit,
    /// Scale to cover the viewport
    Fill,
    /// One image pixel per screen pixel
    ActualSize,
}

/// Overlay grid spacing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSize {
    spacing_px: f64,
}

impl Default for GridSize {
    fn default() -> Self {
        Self {
            spacing_px: DEFAULT_GRID_SPACING,
        }
    }
}

impl GridSize {
    /// Grid with `spacing_px` between lines; `None` unless positive and finite
    pub fn new(spacing_px: f64) -> Option<Self> {
        (spacing_px.is_finite() && spacing_px > 0.0).then_some(Self { spacing_px })
    }

    pub fn spacing_px(&self) -> f64 {
        self.spacing_px
    }
}

/// The editable state of an open project
///
/// Undoable operations are applied against this.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectState {
    pub image: ImageRef,
    pub measurements: MeasurementCollection,
    pub grid: GridSize,
}

impl ProjectState {
    pub fn new(image: ImageRef) -> Self {
        Self {
            image,
            measurements: MeasurementCollection::new(),
            grid: GridSize::default(),
        }
    }
}

/// Project metadata record
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", from = "MetadataRecord")]
pub struct ProjectMetadata {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub project_id: ProjectId,
    pub original_image_size: ImageSize,
    pub current_image_size: ImageSize,
    pub image_fit_mode: ImageFitMode,
    pub original_file_name: Option<String>,
    pub grid_spacing: f64,
}

/// Metadata as read from disk; fields added after version 1 are optional
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataRecord {
    format_version: u32,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
    project_id: ProjectId,
    original_image_size: ImageSize,
    #[serde(default)]
    current_image_size: Option<ImageSize>,
    #[serde(default)]
    image_fit_mode: ImageFitMode,
    #[serde(default)]
    original_file_name: Option<String>,
    #[serde(default)]
    grid_spacing: Option<f64>,
}

impl From<MetadataRecord> for ProjectMetadata {
    fn from(record: MetadataRecord) -> Self {
        let grid_spacing = record
            .grid_spacing
            .and_then(GridSize::new)
            .unwrap_or_default()
            .spacing_px();
        Self {
            format_version: record.format_version,
            created_at: record.created_at,
            modified_at: record.modified_at,
            project_id: record.project_id,
            original_image_size: record.original_image_size,
            current_image_size: record
                .current_image_size
                .unwrap_or(record.original_image_size),
            image_fit_mode: record.image_fit_mode,
            original_file_name: record.original_file_name,
            grid_spacing,
        }
    }
}

impl ProjectMetadata {
    /// Metadata for a project created now from an image of `size`
    pub fn new(size: ImageSize, original_file_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            format_version: FORMAT_VERSION,
            created_at: now,
            modified_at: now,
            project_id: ProjectId::new_v4(),
            original_image_size: size,
            current_image_size: size,
            image_fit_mode: ImageFitMode::default(),
            original_file_name,
            grid_spacing: DEFAULT_GRID_SPACING,
        }
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    /// Display name: the original file stem, or the project id
    pub fn display_name(&self) -> String {
        self.original_file_name
            .as_deref()
            .and_then(|name| Path::new(name).file_stem())
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.project_id.to_string())
    }
}

/// Everything persisted in one project file
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPackage {
    pub metadata: ProjectMetadata,
    pub image: ImageRef,
    pub measurements: MeasurementCollection,
}

impl ProjectPackage {
    /// Grid stored in the metadata, falling back to the default spacing
    pub fn grid(&self) -> GridSize {
        GridSize::new(self.metadata.grid_spacing).unwrap_or_default()
    }

    /// Split into the live state and its metadata
    pub fn into_state(self) -> (ProjectState, ProjectMetadata) {
        let grid = self.grid();
        let state = ProjectState {
            image: self.image,
            measurements: self.measurements,
            grid,
        };
        (state, self.metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_size_validation() {
        assert!(GridSize::new(0.0).is_none());
        assert!(GridSize::new(-5.0).is_none());
        assert!(GridSize::new(f64::NAN).is_none());
        assert_eq!(GridSize::new(25.0).map(|g| g.spacing_px()), Some(25.0));
        assert_eq!(GridSize::default().spacing_px(), DEFAULT_GRID_SPACING);
    }

    #[test]
    fn test_version_one_metadata_defaults() {
        let json = r#"{
            "formatVersion": 1,
            "createdAt": "2024-03-01T10:00:00Z",
            "modifiedAt": "2024-03-02T10:00:00Z",
            "projectId": "6f1c1a0e-0b43-4a55-9d0e-6a3c9f2e7b11",
            "originalImageSize": {"width": 640, "height": 480}
        }"#;
        let metadata: ProjectMetadata = serde_json::from_str(json).unwrap();

        assert_eq!(metadata.format_version, 1);
        assert_eq!(metadata.current_image_size, ImageSize::new(640, 480));
        assert_eq!(metadata.image_fit_mode, ImageFitMode::Fit);
        assert_eq!(metadata.original_file_name, None);
        assert_eq!(metadata.grid_spacing, DEFAULT_GRID_SPACING);
    }

    #[test]
    fn test_metadata_round_trips_through_json() {
        let mut metadata = ProjectMetadata::new(ImageSize::new(100, 80), Some("bench.jpg".into()));
        metadata.image_fit_mode = ImageFitMode::ActualSize;
        metadata.current_image_size = ImageSize::new(80, 100);

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"currentImageSize\""));
        let back: ProjectMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_display_name_uses_file_stem() {
        let metadata = ProjectMetadata::new(ImageSize::new(1, 1), Some("garage door.png".into()));
        assert_eq!(metadata.display_name(), "garage door");

        let anonymous = ProjectMetadata::new(ImageSize::new(1, 1), None);
        assert_eq!(anonymous.display_name(), anonymous.project_id.to_string());
    }

    #[test]
    fn test_package_into_state_keeps_grid() {
        let mut metadata = ProjectMetadata::new(ImageSize::new(10, 10), None);
        metadata.grid_spacing = 12.5;
        let package = ProjectPackage {
            metadata,
            image: ImageRef::new("photo.png", ImageSize::new(10, 10)),
            measurements: MeasurementCollection::new(),
        };
        let (state, _) = package.into_state();
        assert_eq!(state.grid.spacing_px(), 12.5);
    }
}
