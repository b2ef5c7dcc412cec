//! Project session
//!
//! One [`ProjectSession`] exists per open project. It owns the editable
//! project state, the undo history and the placement session, and is the
//! only place where user actions are turned into recorded mutations. All of
//! its methods run on the event thread; background saves and loads hand
//! their results back through [`ProjectSession::apply_io_outcome`].

use crate::autosave::{AutosaveDecision, AutosaveTimer};
use crate::calibration::Calibration;
use crate::codec::ProjectCodec;
use crate::collection::MeasurementCollection;
use crate::config::EngineConfig;
use crate::detection::{self, QuadCandidate};
use crate::error::{MeasurementError, MeasurementResult, ProjectError, ProjectResult};
use crate::geometry::Point;
use crate::history::{GestureRecorder, HistoryStep, UndoRedoStack, UndoableOperation};
use crate::imaging::{ImageProcessor, ImageResult, ImageTransform};
use crate::measurement::{Measurement, MeasurementId, MeasurementStyle};
use crate::placement::{PlacementOutcome, PlacementSession, PointerEvent, Tool};
use crate::project::{GridSize, ImageRef, ImageSize, ProjectMetadata, ProjectPackage, ProjectState};
use crate::recent::{NoRecentProjects, RecentProjects};
use crate::worker::{IoJob, IoOutcome, ProjectWorker};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A handle drag in progress
#[derive(Debug)]
struct HandleDrag {
    id: MeasurementId,
    handle: usize,
    recorder: GestureRecorder,
}

/// A background save waiting for its outcome
#[derive(Debug)]
struct PendingSave {
    metadata: ProjectMetadata,
    generation: u64,
}

/// An open project and everything needed to edit it
pub struct ProjectSession {
    config: EngineConfig,
    codec: ProjectCodec,
    state: ProjectState,
    metadata: ProjectMetadata,
    project_path: Option<PathBuf>,
    history: UndoRedoStack,
    placement: PlacementSession,
    drag: Option<HandleDrag>,
    recent: Box<dyn RecentProjects>,
    autosave: AutosaveTimer,
    dirty: bool,
    /// Bumped on every recorded mutation
    generation: u64,
    io_in_flight: bool,
    pending_save: Option<PendingSave>,
    image_op_in_flight: bool,
}

impl ProjectSession {
    /// Start a new, unsaved project from an image
    pub fn new_from_image(image: ImageRef, config: EngineConfig, codec: ProjectCodec) -> Self {
        let metadata = ProjectMetadata::new(image.size, image.file_name());
        let mut state = ProjectState::new(image);
        state.grid = GridSize::new(config.default_grid_spacing_px).unwrap_or_default();
        Self {
            history: UndoRedoStack::new(config.history_depth),
            placement: PlacementSession::new(config.placement()),
            autosave: AutosaveTimer::new(config.autosave(), Instant::now()),
            config,
            codec,
            state,
            metadata,
            project_path: None,
            drag: None,
            recent: Box::new(NoRecentProjects),
            dirty: false,
            generation: 0,
            io_in_flight: false,
            pending_save: None,
            image_op_in_flight: false,
        }
    }

    /// Open a project file into a new session
    ///
    /// `recent` is attached before loading, so it hears about this load.
    pub fn open(
        path: &Path,
        config: EngineConfig,
        codec: ProjectCodec,
        recent: Box<dyn RecentProjects>,
    ) -> ProjectResult<Self> {
        let package = codec.load(path)?;
        let image = package.image.clone();
        let mut session = Self::new_from_image(image, config, codec).with_recent_projects(recent);
        session.replace_with_package(package, path);
        Ok(session)
    }

    /// Send save/load notifications to `recent`
    pub fn with_recent_projects(mut self, recent: Box<dyn RecentProjects>) -> Self {
        self.recent = recent;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn measurements(&self) -> &MeasurementCollection {
        &self.state.measurements
    }

    pub fn calibration(&self) -> &Calibration {
        self.state.measurements.calibration()
    }

    pub fn image(&self) -> &ImageRef {
        &self.state.image
    }

    pub fn grid(&self) -> GridSize {
        self.state.grid
    }

    pub fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    /// Where the project was last saved or loaded from
    pub fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    pub fn history(&self) -> &UndoRedoStack {
        &self.history
    }

    pub fn placement(&self) -> &PlacementSession {
        &self.placement
    }

    /// Unsaved changes exist
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// An image or geometry operation is in flight
    pub fn is_busy(&self) -> bool {
        self.io_in_flight
            || self.image_op_in_flight
            || self.placement.is_in_progress()
            || self.drag.is_some()
    }

    /// Start over with a new image, discarding measurements and history
    ///
    /// Refused while a background save, load or image transform is pending.
    pub fn open_image(&mut self, image: ImageRef) -> ProjectResult<()> {
        if self.io_in_flight || self.image_op_in_flight {
            return Err(ProjectError::Busy);
        }
        self.abandon_gestures();
        self.metadata = ProjectMetadata::new(image.size, image.file_name());
        self.state = ProjectState::new(image);
        self.state.grid = GridSize::new(self.config.default_grid_spacing_px).unwrap_or_default();
        self.project_path = None;
        self.history.clear();
        self.dirty = false;
        self.generation += 1;
        self.pending_save = None;
        Ok(())
    }

    // Placement

    /// Arm a placement tool, cancelling any placement in progress
    pub fn begin_tool(&mut self, tool: Tool) -> PlacementOutcome {
        self.cancel_handle_drag();
        self.placement.begin(tool)
    }

    /// Disarm the current tool; always succeeds
    pub fn cancel_tool(&mut self) -> PlacementOutcome {
        self.placement.cancel()
    }

    /// Feed one pointer event to the placement session
    ///
    /// A committed primitive is registered in the collection and recorded as
    /// one geometry edit; the returned outcome carries it as registered.
    pub fn handle_pointer_event(&mut self, event: PointerEvent) -> ProjectResult<PlacementOutcome> {
        let calibration = self.calibration().clone();
        let outcome = self.placement.handle_pointer_event(event, &calibration);
        self.register_placement(outcome)
    }

    /// Commit the polygon being placed as an open polygon
    pub fn finish_polygon(&mut self) -> ProjectResult<PlacementOutcome> {
        let calibration = self.calibration().clone();
        let outcome = self.placement.finish(&calibration);
        self.register_placement(outcome)
    }

    fn register_placement(&mut self, outcome: PlacementOutcome) -> ProjectResult<PlacementOutcome> {
        let measurement = match outcome {
            PlacementOutcome::Committed(measurement) => measurement,
            other => return Ok(other),
        };
        let measurement = measurement.with_style(self.config.default_style);
        let id = self.edit_measurements(|c| c.insert(measurement))?;
        let registered = self
            .state
            .measurements
            .get(id)
            .cloned()
            .ok_or(MeasurementError::UnknownMeasurement(id))?;
        Ok(PlacementOutcome::Committed(registered))
    }

    // Editing existing measurements

    /// Grab the handle under `point`, if any
    ///
    /// Ignored while a placement is in progress.
    pub fn begin_handle_drag(&mut self, point: Point, tolerance: f64) -> Option<(MeasurementId, usize)> {
        if self.placement.is_in_progress() || self.drag.is_some() {
            return None;
        }
        let (id, handle) = self.state.measurements.hit_test(&point, tolerance)?;
        let recorder = GestureRecorder::begin(&self.state.measurements);
        if let Err(err) = self.state.measurements.set_editing(id, true) {
            tracing::warn!(%err, "handle drag target vanished");
            return None;
        }
        self.drag = Some(HandleDrag {
            id,
            handle,
            recorder,
        });
        Some((id, handle))
    }

    /// Move the grabbed handle; nothing is recorded until the drag ends
    pub fn drag_handle_to(&mut self, point: Point) -> ProjectResult<()> {
        let Some(drag) = &self.drag else {
            return Ok(());
        };
        self.state
            .measurements
            .move_point(drag.id, drag.handle, point)
            .map_err(ProjectError::from)
    }

    /// Release the handle, recording the whole drag as one edit
    ///
    /// Returns whether anything was recorded.
    pub fn end_handle_drag(&mut self) -> bool {
        let Some(drag) = self.drag.take() else {
            return false;
        };
        if let Err(err) = self.state.measurements.set_editing(drag.id, false) {
            tracing::warn!(%err, "handle drag target vanished");
        }
        match drag.recorder.finish(&self.state.measurements) {
            Some(op) => {
                self.record(op);
                true
            }
            None => false,
        }
    }

    /// Abort a handle drag, putting the geometry back
    pub fn cancel_handle_drag(&mut self) {
        if let Some(drag) = self.drag.take() {
            self.state.measurements = drag.recorder.before().clone();
        }
    }

    /// Move a whole measurement
    pub fn translate_measurement(&mut self, id: MeasurementId, dx: f64, dy: f64) -> ProjectResult<()> {
        self.edit_measurements(|c| c.translate(id, dx, dy))
    }

    pub fn set_measurement_style(&mut self, id: MeasurementId, style: MeasurementStyle) -> ProjectResult<()> {
        self.edit_measurements(|c| c.set_style(id, style))
    }

    /// Select one measurement; not recorded in history
    pub fn select(&mut self, id: MeasurementId) -> ProjectResult<()> {
        self.state.measurements.select(id).map_err(ProjectError::from)
    }

    pub fn clear_selection(&mut self) {
        self.state.measurements.clear_selection();
    }

    /// Delete a measurement
    pub fn remove_measurement(&mut self, id: MeasurementId) -> ProjectResult<Measurement> {
        self.edit_measurements(|c| c.remove(id))
    }

    /// Delete every measurement, keeping the calibration
    pub fn clear_measurements(&mut self) {
        self.settle_handle_drag();
        if self.state.measurements.is_empty() {
            return;
        }
        let before = self.state.measurements.clone();
        self.state.measurements.clear();
        self.record(UndoableOperation::geometry_edit(before, self.state.measurements.clone()));
    }

    // Calibration

    /// Replace the project calibration; returns how many measurements were updated
    pub fn set_calibration(&mut self, calibration: Calibration) -> usize {
        self.settle_handle_drag();
        let before = self.state.measurements.clone();
        let notified = self.state.measurements.set_calibration(calibration);
        self.record(UndoableOperation::geometry_edit(before, self.state.measurements.clone()));
        tracing::info!(
            scale_factor = self.calibration().scale_factor(),
            units = self.calibration().units(),
            "calibration changed"
        );
        notified
    }

    /// Calibrate from a reference segment of known real length
    pub fn calibrate_from_reference(
        &mut self,
        p0: Point,
        p1: Point,
        known_length: f64,
        units: &str,
    ) -> ProjectResult<Calibration> {
        let calibration = Calibration::from_reference(p0, p1, known_length, units)?;
        self.set_calibration(calibration.clone());
        Ok(calibration)
    }

    // Image and grid

    /// Swap in a new working image (result of a transform or re-import)
    pub fn replace_image(&mut self, image: ImageRef) {
        self.settle_handle_drag();
        if image == self.state.image {
            return;
        }
        let before = std::mem::replace(&mut self.state.image, image);
        self.record(UndoableOperation::ImageReplace {
            before,
            after: self.state.image.clone(),
        });
    }

    /// Mark an image transform as running elsewhere and get its input
    pub fn begin_image_transform(&mut self) -> ProjectResult<ImageRef> {
        if self.image_op_in_flight || self.io_in_flight {
            return Err(ProjectError::Busy);
        }
        self.image_op_in_flight = true;
        Ok(self.state.image.clone())
    }

    /// Finish a transform started with [`Self::begin_image_transform`]
    pub fn finish_image_transform(&mut self, result: ImageResult<ImageRef>) -> ProjectResult<()> {
        self.image_op_in_flight = false;
        let image = result?;
        self.replace_image(image);
        Ok(())
    }

    /// Run `op` through `processor` and record the result
    pub fn transform_image(
        &mut self,
        processor: &dyn ImageProcessor,
        op: ImageTransform,
    ) -> ProjectResult<()> {
        let input = self.begin_image_transform()?;
        let result = processor.transform(&input, op);
        self.finish_image_transform(result)
    }

    pub fn resize_grid(&mut self, spacing_px: f64) -> ProjectResult<()> {
        let grid = GridSize::new(spacing_px).ok_or(ProjectError::InvalidGridSpacing(spacing_px))?;
        self.settle_handle_drag();
        if grid == self.state.grid {
            return Ok(());
        }
        let before = std::mem::replace(&mut self.state.grid, grid);
        self.record(UndoableOperation::GridResize {
            before,
            after: grid,
        });
        Ok(())
    }

    /// Add a fully specified measurement, keeping its own style
    pub fn add_measurement(&mut self, measurement: Measurement) -> ProjectResult<MeasurementId> {
        self.abandon_gestures();
        self.edit_measurements(|c| c.insert(measurement))
    }

    /// Add a closed polygon from a detected quadrilateral
    pub fn seed_from_detection(
        &mut self,
        candidate: &QuadCandidate,
        detector_size: ImageSize,
    ) -> ProjectResult<MeasurementId> {
        let seeded = detection::seed_polygon(candidate, detector_size, self.state.image.size)
            .with_style(self.config.default_style);
        self.edit_measurements(|c| c.insert(seeded))
    }

    // History

    pub fn undo(&mut self) -> HistoryStep {
        self.abandon_gestures();
        let step = self.history.undo(&mut self.state);
        self.after_history_step(step)
    }

    pub fn redo(&mut self) -> HistoryStep {
        self.abandon_gestures();
        let step = self.history.redo(&mut self.state);
        self.after_history_step(step)
    }

    fn after_history_step(&mut self, step: HistoryStep) -> HistoryStep {
        if let HistoryStep::Applied(_) = step {
            self.dirty = true;
            self.generation += 1;
        }
        step
    }

    // Persistence

    /// Snapshot of the project for saving
    pub fn to_package(&self) -> ProjectPackage {
        let mut metadata = self.metadata.clone();
        metadata.current_image_size = self.state.image.size;
        metadata.grid_spacing = self.state.grid.spacing_px();
        ProjectPackage {
            metadata,
            image: self.state.image.clone(),
            measurements: self.state.measurements.clone(),
        }
    }

    /// Save to `path` on the calling thread
    ///
    /// On success the history is cleared and the project is clean.
    pub fn save(&mut self, path: &Path) -> ProjectResult<()> {
        if self.io_in_flight {
            return Err(ProjectError::Busy);
        }
        let mut package = self.to_package();
        package.metadata.touch();
        self.codec.save(&package, path)?;
        self.finish_save(package.metadata, path, self.generation);
        Ok(())
    }

    /// Replace this session's project with the file at `path`
    ///
    /// On failure the session is left exactly as it was.
    pub fn load(&mut self, path: &Path) -> ProjectResult<()> {
        if self.io_in_flight {
            return Err(ProjectError::Busy);
        }
        let package = self.codec.load(path)?;
        self.replace_with_package(package, path);
        Ok(())
    }

    /// Queue a save on the background worker
    pub fn save_in_background(&mut self, worker: &ProjectWorker, path: &Path) -> ProjectResult<()> {
        if self.io_in_flight {
            return Err(ProjectError::Busy);
        }
        let mut package = self.to_package();
        package.metadata.touch();
        let pending = PendingSave {
            metadata: package.metadata.clone(),
            generation: self.generation,
        };
        worker.submit(IoJob::Save {
            package,
            path: path.to_path_buf(),
        })?;
        self.pending_save = Some(pending);
        self.io_in_flight = true;
        Ok(())
    }

    /// Queue a load on the background worker
    pub fn load_in_background(&mut self, worker: &ProjectWorker, path: &Path) -> ProjectResult<()> {
        if self.io_in_flight {
            return Err(ProjectError::Busy);
        }
        worker.submit(IoJob::Load {
            path: path.to_path_buf(),
        })?;
        self.io_in_flight = true;
        Ok(())
    }

    /// Apply the result of a background save or load
    pub fn apply_io_outcome(&mut self, outcome: IoOutcome) -> ProjectResult<()> {
        self.io_in_flight = false;
        match outcome {
            IoOutcome::Saved { path, result } => {
                let pending = self.pending_save.take();
                result?;
                if let Some(pending) = pending {
                    self.finish_save(pending.metadata, &path, pending.generation);
                }
                Ok(())
            }
            IoOutcome::Loaded { path, result } => {
                let package = result?;
                self.replace_with_package(package, &path);
                Ok(())
            }
        }
    }

    /// Replace the whole project with a loaded package
    pub fn apply_loaded_package(&mut self, package: ProjectPackage, path: &Path) {
        self.replace_with_package(package, path);
    }

    /// Run the autosave policy, queueing a background save when due
    ///
    /// Projects that were never saved have nowhere to autosave to.
    pub fn autosave(&mut self, now: Instant, worker: &ProjectWorker) -> ProjectResult<AutosaveDecision> {
        let Some(path) = self.project_path.clone() else {
            return Ok(AutosaveDecision::Disabled);
        };
        let decision = self.autosave.poll(now, self.dirty, self.is_busy());
        if decision == AutosaveDecision::Save {
            tracing::debug!(path = %path.display(), "autosave");
            self.save_in_background(worker, &path)?;
        }
        Ok(decision)
    }

    fn finish_save(&mut self, metadata: ProjectMetadata, path: &Path, generation: u64) {
        self.metadata = metadata;
        self.project_path = Some(path.to_path_buf());
        if generation == self.generation {
            self.dirty = false;
            self.history.clear();
        }
        self.autosave.reset(Instant::now());
        self.notify_recent(path);
    }

    fn replace_with_package(&mut self, package: ProjectPackage, path: &Path) {
        self.abandon_gestures();
        let (state, metadata) = package.into_state();
        self.state = state;
        self.metadata = metadata;
        self.project_path = Some(path.to_path_buf());
        self.history.clear();
        self.dirty = false;
        self.generation += 1;
        self.pending_save = None;
        self.autosave.reset(Instant::now());
        self.notify_recent(path);
    }

    fn notify_recent(&mut self, path: &Path) {
        self.recent.add_recent_project(
            self.metadata.project_id,
            &self.metadata.display_name(),
            path,
            Utc::now(),
        );
    }

    /// Drop any in-progress placement and restore any grabbed handle
    fn abandon_gestures(&mut self) {
        self.placement.cancel();
        self.cancel_handle_drag();
    }

    /// Commit a grabbed handle as its own edit before another edit is recorded
    fn settle_handle_drag(&mut self) {
        if self.end_handle_drag() {
            tracing::debug!("handle drag committed ahead of another edit");
        }
    }

    /// Apply `edit` to the measurements and record it as one operation
    ///
    /// Nothing is recorded when `edit` fails.
    fn edit_measurements<T>(
        &mut self,
        edit: impl FnOnce(&mut MeasurementCollection) -> MeasurementResult<T>,
    ) -> ProjectResult<T> {
        self.settle_handle_drag();
        let before = self.state.measurements.clone();
        let value = edit(&mut self.state.measurements)?;
        self.record(UndoableOperation::geometry_edit(before, self.state.measurements.clone()));
        Ok(value)
    }

    fn record(&mut self, op: UndoableOperation) {
        self.history.push(op);
        self.dirty = true;
        self.generation += 1;
    }
}
