//! Error types for the measurement model and project I/O

use crate::imaging::ImageError;
use crate::measurement::{MeasurementId, MeasurementKind};
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Number of defining points a measurement kind accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many points
    Exactly(usize),
    /// Any number of points, at least this many
    AtLeast(usize),
    /// A single scalar position instead of points
    Scalar,
}

impl Arity {
    /// Check whether `count` points satisfy this arity
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Scalar => false,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "exactly {n} points"),
            Arity::AtLeast(n) => write!(f, "at least {n} points"),
            Arity::Scalar => write!(f, "a scalar position"),
        }
    }
}

/// Errors raised by measurement and collection operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeasurementError {
    /// Wrong number of points for a measurement kind
    #[error("{kind} expects {expected}, got {got} points")]
    InvalidArity {
        kind: MeasurementKind,
        expected: Arity,
        got: usize,
    },

    /// Scale factor not strictly positive and finite, or a bad reference
    #[error("invalid calibration: {0}")]
    InvalidCalibration(&'static str),

    /// A measurement with this id already exists in the collection
    #[error("duplicate measurement id {0}")]
    DuplicateId(MeasurementId),

    /// No measurement with this id (never existed or removed)
    #[error("unknown measurement id {0}")]
    UnknownMeasurement(MeasurementId),

    /// Point index outside the shape's defining points
    #[error("point index {index} out of range ({count} points)")]
    PointIndexOutOfRange { index: usize, count: usize },

    /// Vertex operations on something other than a polygon
    #[error("{0} is not a polygon")]
    NotAPolygon(MeasurementKind),
}

/// Result type for measurement operations
pub type MeasurementResult<T> = Result<T, MeasurementError>;

/// Errors raised while saving, loading or editing an open project
///
/// Failures never leave the in-memory project partially modified.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    /// Unreadable or unparseable archive, metadata or measurements
    #[error("corrupt project file {path}: {reason}")]
    CorruptProject { path: PathBuf, reason: String },

    /// The image payload is absent or cannot be decoded
    #[error("project file {path} has no readable image")]
    MissingImage { path: PathBuf },

    /// Written by a newer version of the format
    #[error("project file {path} has format version {found}, newer than supported {supported}")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    /// Writing failed; the file at `path` is untouched
    #[error("failed to save project to {path}: {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The loaded image could not be written to the working directory
    #[error("failed to extract project image to {path}: {source}")]
    ExtractFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Grid spacing must be positive and finite
    #[error("invalid grid spacing {0}")]
    InvalidGridSpacing(f64),

    /// Another image or project operation is still running
    #[error("another project operation is in progress")]
    Busy,

    /// The background I/O worker is gone
    #[error("background project worker has stopped")]
    WorkerStopped,

    #[error(transparent)]
    Measurement(#[from] MeasurementError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Result type for project operations
pub type ProjectResult<T> = Result<T, ProjectError>;
