//! Project file codec
//!
//! A project file is a small archive of named payloads:
//!
//! ```text
//! magic "PMPJ" | container version u16 | entry count u32
//! per entry: name length u16 | UTF-8 name | payload length u64 | payload
//! ```
//!
//! All integers are little-endian. Three entries are written: `image` (the
//! encoded bitmap), `metadata` (JSON) and `measurements` (JSON). Unknown
//! entries are skipped on load.
//!
//! Saves are atomic: the archive is written to a temporary file next to the
//! target, synced, then renamed over it.

use crate::calibration::Calibration;
use crate::collection::MeasurementCollection;
use crate::error::{ProjectError, ProjectResult};
use crate::imaging;
use crate::measurement::{Measurement, MeasurementId, MeasurementKind, MeasurementStyle, Shape};
use crate::project::{ImageRef, ProjectMetadata, ProjectPackage, FORMAT_VERSION};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// Leading bytes of every project file
pub const ARCHIVE_MAGIC: [u8; 4] = *b"PMPJ";

/// Version of the archive framing (not of the payloads)
pub const CONTAINER_VERSION: u16 = 1;

/// Conventional project file extension
pub const PROJECT_EXTENSION: &str = "pmproj";

const IMAGE_ENTRY: &str = "image";
const METADATA_ENTRY: &str = "metadata";
const MEASUREMENTS_ENTRY: &str = "measurements";

/// One persisted measurement: identity, geometry and style
///
/// Derived values are not stored; they are recomputed on load.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct MeasurementRecord {
    id: MeasurementId,
    #[serde(flatten)]
    shape: Shape,
    #[serde(default)]
    style: MeasurementStyle,
}

impl From<&Measurement> for MeasurementRecord {
    fn from(m: &Measurement) -> Self {
        Self {
            id: m.id(),
            shape: m.shape().clone(),
            style: *m.style(),
        }
    }
}

/// The `measurements` payload: calibration plus per-kind ordered lists
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeasurementsRecord {
    calibration: Calibration,
    #[serde(default)]
    distances: Vec<MeasurementRecord>,
    #[serde(default)]
    angles: Vec<MeasurementRecord>,
    #[serde(default)]
    rectangles: Vec<MeasurementRecord>,
    #[serde(default)]
    circles: Vec<MeasurementRecord>,
    #[serde(default)]
    polygons: Vec<MeasurementRecord>,
    #[serde(default)]
    guide_lines: Vec<MeasurementRecord>,
}

impl MeasurementsRecord {
    fn from_collection(collection: &MeasurementCollection) -> Self {
        let records = |kind| {
            collection
                .of_kind(kind)
                .iter()
                .map(MeasurementRecord::from)
                .collect()
        };
        Self {
            calibration: collection.calibration().clone(),
            distances: records(MeasurementKind::Distance),
            angles: records(MeasurementKind::Angle),
            rectangles: records(MeasurementKind::Rectangle),
            circles: records(MeasurementKind::Circle),
            polygons: records(MeasurementKind::Polygon),
            guide_lines: records(MeasurementKind::GuideLine),
        }
    }

    fn into_collection(self) -> Result<MeasurementCollection, String> {
        let mut collection = MeasurementCollection::with_calibration(self.calibration);
        let lists = [
            (MeasurementKind::Distance, self.distances),
            (MeasurementKind::Angle, self.angles),
            (MeasurementKind::Rectangle, self.rectangles),
            (MeasurementKind::Circle, self.circles),
            (MeasurementKind::Polygon, self.polygons),
            (MeasurementKind::GuideLine, self.guide_lines),
        ];
        for (kind, records) in lists {
            for record in records {
                if record.shape.kind() != kind {
                    return Err(format!(
                        "{} measurement {} stored in the {kind} list",
                        record.shape.kind(),
                        record.id
                    ));
                }
                let measurement = Measurement::with_id(record.id, record.shape).with_style(record.style);
                collection.insert(measurement).map_err(|e| e.to_string())?;
            }
        }
        Ok(collection)
    }
}

/// Only the version field, read before the full metadata
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionHeader {
    format_version: u32,
}

/// Reads and writes project files
///
/// Loaded images are extracted into `work_dir`, since the engine only ever
/// refers to images by path.
#[derive(Debug, Clone)]
pub struct ProjectCodec {
    work_dir: PathBuf,
}

impl ProjectCodec {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Directory that receives extracted images
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Write `package` to `path`, replacing any existing file atomically
    ///
    /// The image payload is read from the package's image reference. On
    /// failure the file at `path` is left as it was.
    pub fn save(&self, package: &ProjectPackage, path: &Path) -> ProjectResult<()> {
        let fail = |source: io::Error| ProjectError::SaveFailed {
            path: path.to_path_buf(),
            source,
        };

        let image = fs::read(&package.image.path).map_err(fail)?;

        let mut metadata = package.metadata.clone();
        metadata.format_version = FORMAT_VERSION;
        let metadata = serde_json::to_vec_pretty(&metadata).map_err(|e| fail(io::Error::other(e)))?;
        let measurements =
            serde_json::to_vec_pretty(&MeasurementsRecord::from_collection(&package.measurements))
                .map_err(|e| fail(io::Error::other(e)))?;

        let archive = encode_archive(&[
            (IMAGE_ENTRY, image.as_slice()),
            (METADATA_ENTRY, metadata.as_slice()),
            (MEASUREMENTS_ENTRY, measurements.as_slice()),
        ])
        .map_err(fail)?;

        write_atomically(path, &archive).map_err(fail)?;

        tracing::info!(
            path = %path.display(),
            measurements = package.measurements.len(),
            bytes = archive.len(),
            "project saved"
        );
        Ok(())
    }

    /// Read a project file
    ///
    /// Older format versions load with their missing fields defaulted;
    /// newer ones are rejected.
    pub fn load(&self, path: &Path) -> ProjectResult<ProjectPackage> {
        let corrupt = |reason: String| ProjectError::CorruptProject {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| corrupt(format!("unreadable archive: {e}")))?;
        let mut entries = decode_archive(&bytes).map_err(corrupt)?;

        let metadata = entries
            .remove(METADATA_ENTRY)
            .ok_or_else(|| corrupt("missing metadata payload".to_string()))?;
        let header: VersionHeader = serde_json::from_slice(&metadata)
            .map_err(|e| corrupt(format!("unparseable metadata: {e}")))?;
        if header.format_version > FORMAT_VERSION {
            return Err(ProjectError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: header.format_version,
                supported: FORMAT_VERSION,
            });
        }
        if header.format_version == 0 {
            return Err(corrupt("format version 0".to_string()));
        }
        let metadata: ProjectMetadata = serde_json::from_slice(&metadata)
            .map_err(|e| corrupt(format!("unparseable metadata: {e}")))?;

        let measurements = entries
            .remove(MEASUREMENTS_ENTRY)
            .ok_or_else(|| corrupt("missing measurements payload".to_string()))?;
        let measurements: MeasurementsRecord = serde_json::from_slice(&measurements)
            .map_err(|e| corrupt(format!("unparseable measurements: {e}")))?;
        let measurements = measurements.into_collection().map_err(corrupt)?;

        let missing_image = || ProjectError::MissingImage {
            path: path.to_path_buf(),
        };
        let image = entries.remove(IMAGE_ENTRY).ok_or_else(missing_image)?;
        let (size, format) = imaging::sniff_bytes(&image).ok_or_else(missing_image)?;

        let image_path = self.work_dir.join(format!(
            "{}-{}.{}",
            metadata.project_id,
            uuid::Uuid::new_v4().simple(),
            format.extension()
        ));
        fs::create_dir_all(&self.work_dir)
            .and_then(|()| fs::write(&image_path, &image))
            .map_err(|source| ProjectError::ExtractFailed {
                path: image_path.clone(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            version = metadata.format_version,
            measurements = measurements.len(),
            "project loaded"
        );

        Ok(ProjectPackage {
            metadata,
            image: ImageRef::new(image_path, size),
            measurements,
        })
    }
}

/// Frame named payloads into an archive
fn encode_archive(entries: &[(&str, &[u8])]) -> io::Result<Vec<u8>> {
    let payload: usize = entries.iter().map(|(name, data)| name.len() + data.len() + 10).sum();
    let mut out = Vec::with_capacity(payload + 10);
    out.write_all(&ARCHIVE_MAGIC)?;
    out.write_u16::<LittleEndian>(CONTAINER_VERSION)?;
    out.write_u32::<LittleEndian>(entries.len() as u32)?;
    for (name, data) in entries {
        let name_len = u16::try_from(name.len()).map_err(io::Error::other)?;
        out.write_u16::<LittleEndian>(name_len)?;
        out.write_all(name.as_bytes())?;
        out.write_u64::<LittleEndian>(data.len() as u64)?;
        out.write_all(data)?;
    }
    Ok(out)
}

/// Split an archive into its named payloads
fn decode_archive(bytes: &[u8]) -> Result<HashMap<String, Vec<u8>>, String> {
    let mut cursor = Cursor::new(bytes);
    let truncated = |e: io::Error| format!("truncated archive: {e}");

    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic).map_err(truncated)?;
    if magic != ARCHIVE_MAGIC {
        return Err("not a project archive".to_string());
    }
    let version = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
    if version != CONTAINER_VERSION {
        return Err(format!("unknown container version {version}"));
    }

    let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    let mut entries = HashMap::new();
    for _ in 0..count {
        let name_len = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let mut name = vec![0u8; usize::from(name_len)];
        cursor.read_exact(&mut name).map_err(truncated)?;
        let name = String::from_utf8(name).map_err(|_| "entry name is not UTF-8".to_string())?;

        let len = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
        let remaining = bytes.len() as u64 - cursor.position();
        if len > remaining {
            return Err(format!("entry {name} claims {len} bytes, {remaining} left"));
        }
        let mut data = vec![0u8; len as usize];
        cursor.read_exact(&mut data).map_err(truncated)?;

        if !matches!(name.as_str(), IMAGE_ENTRY | METADATA_ENTRY | MEASUREMENTS_ENTRY) {
            tracing::debug!(entry = %name, "skipping unknown archive entry");
            continue;
        }
        entries.insert(name, data);
    }
    Ok(entries)
}

/// Write `bytes` to a temporary file beside `path`, sync, then rename over it
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::measurement::{Color, GuideOrientation};
    use crate::project::ImageSize;
    use tempfile::TempDir;

    fn write_png(dir: &Path, width: u32, height: u32) -> ImageRef {
        let path = dir.join("source.png");
        image::RgbImage::new(width, height).save(&path).unwrap();
        ImageRef::new(path, ImageSize::new(width, height))
    }

    fn every_kind() -> MeasurementCollection {
        let mut c = MeasurementCollection::with_calibration(Calibration::new(0.1, "cm").unwrap());
        let p = Point::new;
        c.insert(Measurement::create(MeasurementKind::Distance, &[p(1.0, 2.0), p(30.5, 40.25)]).unwrap())
            .unwrap();
        c.insert(
            Measurement::create(MeasurementKind::Angle, &[p(1.0, 0.0), p(0.0, 0.0), p(0.0, 1.0)])
                .unwrap(),
        )
        .unwrap();
        c.insert(
            Measurement::create(MeasurementKind::Rectangle, &[p(0.0, 0.0), p(100.0, 50.0)])
                .unwrap()
                .with_style(MeasurementStyle {
                    color: Color::MAGENTA,
                    thickness: 3.5,
                }),
        )
        .unwrap();
        c.insert(Measurement::create(MeasurementKind::Circle, &[p(5.0, 5.0), p(8.0, 9.0)]).unwrap())
            .unwrap();
        let mut polygon = Measurement::create(
            MeasurementKind::Polygon,
            &[p(0.0, 0.0), p(10.0, 0.0), p(10.0, 10.0)],
        )
        .unwrap();
        polygon.add_vertex(p(0.0, 0.0), 10.0).unwrap();
        c.insert(polygon).unwrap();
        c.insert(Measurement::create(MeasurementKind::Polygon, &[p(3.0, 3.0), p(4.0, 7.0)]).unwrap())
            .unwrap();
        c.insert(Measurement::guide_line(GuideOrientation::Horizontal, 12.0))
            .unwrap();
        c
    }

    fn package(dir: &TempDir, measurements: MeasurementCollection) -> ProjectPackage {
        let image = write_png(dir.path(), 16, 8);
        ProjectPackage {
            metadata: ProjectMetadata::new(image.size, Some("source.png".to_string())),
            image,
            measurements,
        }
    }

    fn rewrite_entry(path: &Path, entry: &str, data: &[u8]) {
        let bytes = fs::read(path).unwrap();
        let mut entries = decode_archive(&bytes).unwrap();
        entries.insert(entry.to_string(), data.to_vec());
        let framed: Vec<(&str, &[u8])> = entries
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();
        fs::write(path, encode_archive(&framed).unwrap()).unwrap();
    }

    #[test]
    fn test_round_trip_every_kind() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let original = package(&dir, every_kind());
        let path = dir.path().join("project.pmproj");

        let codec = ProjectCodec::new(dir.path().join("work"));
        codec.save(&original, &path).unwrap();
        let loaded = codec.load(&path).unwrap();

        assert_eq!(loaded.measurements, original.measurements);
        assert_eq!(loaded.metadata, original.metadata);
        assert_eq!(loaded.image.size, ImageSize::new(16, 8));
        assert!(loaded.image.path.starts_with(dir.path().join("work")));
        assert_eq!(
            fs::read(&loaded.image.path).unwrap(),
            fs::read(&original.image.path).unwrap()
        );
        assert!(loaded.measurements.is_consistent());
    }

    #[test]
    fn test_round_trip_ignores_selection() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let mut measurements = every_kind();
        let id = measurements.iter().next().unwrap().id();
        measurements.select(id).unwrap();
        let original = package(&dir, measurements);
        let path = dir.path().join("selected.pmproj");

        let codec = ProjectCodec::new(dir.path().join("work"));
        codec.save(&original, &path).unwrap();
        let loaded = codec.load(&path).unwrap();

        assert!(loaded.measurements.selected().is_none());
        assert_eq!(loaded.measurements, original.measurements);
    }

    #[test]
    fn test_round_trip_empty_collection() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let original = package(&dir, MeasurementCollection::new());
        let path = dir.path().join("empty.pmproj");

        let codec = ProjectCodec::new(dir.path());
        codec.save(&original, &path).unwrap();
        assert_eq!(codec.load(&path).unwrap().measurements, original.measurements);
    }

    #[test]
    fn test_corrupt_measurements_payload() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("project.pmproj");
        let codec = ProjectCodec::new(dir.path());
        codec.save(&package(&dir, every_kind()), &path).unwrap();

        rewrite_entry(&path, MEASUREMENTS_ENTRY, b"{\"calibration\": nope");

        match codec.load(&path) {
            Err(ProjectError::CorruptProject { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected CorruptProject, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_garbage_and_truncation() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("project.pmproj");
        let codec = ProjectCodec::new(dir.path());

        fs::write(&path, b"hello world").unwrap();
        assert!(matches!(codec.load(&path), Err(ProjectError::CorruptProject { .. })));

        codec.save(&package(&dir, every_kind()), &path).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();
        assert!(matches!(codec.load(&path), Err(ProjectError::CorruptProject { .. })));

        let missing = dir.path().join("nope.pmproj");
        assert!(matches!(codec.load(&missing), Err(ProjectError::CorruptProject { .. })));
    }

    #[test]
    fn test_missing_or_unreadable_image() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("project.pmproj");
        let codec = ProjectCodec::new(dir.path());
        codec.save(&package(&dir, every_kind()), &path).unwrap();

        rewrite_entry(&path, IMAGE_ENTRY, b"not an image");
        assert!(matches!(codec.load(&path), Err(ProjectError::MissingImage { .. })));

        let bytes = fs::read(&path).unwrap();
        let mut entries = decode_archive(&bytes).unwrap();
        entries.remove(IMAGE_ENTRY);
        let framed: Vec<(&str, &[u8])> = entries
            .iter()
            .map(|(n, d)| (n.as_str(), d.as_slice()))
            .collect();
        fs::write(&path, encode_archive(&framed).unwrap()).unwrap();
        assert!(matches!(codec.load(&path), Err(ProjectError::MissingImage { .. })));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("project.pmproj");
        let codec = ProjectCodec::new(dir.path());
        let pkg = package(&dir, MeasurementCollection::new());
        codec.save(&pkg, &path).unwrap();

        let mut metadata = serde_json::to_value(&pkg.metadata).unwrap();
        metadata["formatVersion"] = serde_json::json!(FORMAT_VERSION + 1);
        rewrite_entry(&path, METADATA_ENTRY, &serde_json::to_vec(&metadata).unwrap());

        match codec.load(&path) {
            Err(ProjectError::UnsupportedVersion { found, .. }) => assert_eq!(found, FORMAT_VERSION + 1),
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_loads_version_one_file() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let image = write_png(dir.path(), 20, 10);
        let metadata: &[u8] = br#"{
            "formatVersion": 1,
            "createdAt": "2023-11-05T08:00:00Z",
            "modifiedAt": "2023-11-05T09:30:00Z",
            "projectId": "0b9d5b9e-6f5c-4a3b-8d3e-2c1f0a9b8c7d",
            "originalImageSize": {"width": 20, "height": 10}
        }"#;
        let measurements: &[u8] = br#"{
            "calibration": {"scaleFactor": 2.0, "units": "mm"},
            "distances": [
                {"id": "5a4e3d2c-1b0a-4f9e-8d7c-6b5a4f3e2d1c", "type": "distance",
                 "p0": {"x": 0.0, "y": 0.0}, "p1": {"x": 3.0, "y": 4.0}}
            ]
        }"#;
        let archive = encode_archive(&[
            (METADATA_ENTRY, metadata),
            ("thumbnail", b"ignored".as_slice()),
            (MEASUREMENTS_ENTRY, measurements),
            (IMAGE_ENTRY, fs::read(&image.path).unwrap().as_slice()),
        ])
        .unwrap();
        let path = dir.path().join("old.pmproj");
        fs::write(&path, archive).unwrap();

        let loaded = ProjectCodec::new(dir.path()).load(&path).unwrap();
        assert_eq!(loaded.metadata.format_version, 1);
        assert_eq!(loaded.metadata.current_image_size, ImageSize::new(20, 10));
        assert_eq!(loaded.measurements.len(), 1);
        let distance = loaded.measurements.iter().next().unwrap();
        assert_eq!(distance.display_text(), "10.00 mm");
        assert_eq!(*distance.style(), MeasurementStyle::default());
    }

    #[test]
    fn test_failed_save_keeps_existing_file() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = dir.path().join("project.pmproj");
        let codec = ProjectCodec::new(dir.path());
        let mut pkg = package(&dir, every_kind());
        codec.save(&pkg, &path).unwrap();
        let before = fs::read(&path).unwrap();

        pkg.image.path = dir.path().join("gone.png");
        pkg.measurements.clear();
        match codec.save(&pkg, &path) {
            Err(ProjectError::SaveFailed { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected SaveFailed, got {other:?}"),
        }
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_archive_layout() {
        let bytes = encode_archive(&[("a", b"xyz".as_slice())]).unwrap();
        assert_eq!(&bytes[..4], b"PMPJ");
        assert_eq!(&bytes[4..6], &CONTAINER_VERSION.to_le_bytes());
        assert_eq!(&bytes[6..10], &1u32.to_le_bytes());
        assert_eq!(&bytes[10..12], &1u16.to_le_bytes());
        assert_eq!(bytes[12], b'a');
        assert_eq!(&bytes[13..21], &3u64.to_le_bytes());
        assert_eq!(&bytes[21..], b"xyz");
    }
}
