//! Photomeasure core library
//!
//! Measurement and calibration engine: the measurement model, the placement
//! state machine, calibration broadcast, undo/redo and the project file
//! format, tied together by [`ProjectSession`].

pub mod autosave;
pub mod calibration;
pub mod codec;
pub mod collection;
pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod history;
pub mod imaging;
pub mod measurement;
pub mod placement;
pub mod project;
pub mod recent;
pub mod session;
pub mod worker;

pub use autosave::{AutosaveConfig, AutosaveDecision, AutosaveTimer};
pub use calibration::{Calibration, CALIBRATION_UNITS, PIXEL_UNITS};
pub use codec::{ProjectCodec, PROJECT_EXTENSION};
pub use collection::MeasurementCollection;
pub use config::EngineConfig;
pub use detection::{DetectionReport, QuadCandidate, ShapeDetector};
pub use error::{Arity, MeasurementError, MeasurementResult, ProjectError, ProjectResult};
pub use geometry::{Point, Vector};
pub use history::{GestureRecorder, HistoryStep, UndoRedoStack, UndoableOperation};
pub use imaging::{ImageError, ImageFormat, ImageProcessor, ImageResult, ImageTransform};
pub use measurement::{
    Color, GuideOrientation, Measurement, MeasurementId, MeasurementKind, MeasurementStyle,
    Metrics, Shape, VertexOutcome,
};
pub use placement::{
    AbortReason, PlacementConfig, PlacementOutcome, PlacementSession, PlacementState,
    PointerEvent, Tool,
};
pub use project::{
    GridSize, ImageFitMode, ImageRef, ImageSize, ProjectId, ProjectMetadata, ProjectPackage,
    ProjectState, FORMAT_VERSION,
};
pub use recent::{NoRecentProjects, RecentProjects};
pub use session::ProjectSession;
pub use worker::{IoJob, IoOutcome, ProjectWorker};
