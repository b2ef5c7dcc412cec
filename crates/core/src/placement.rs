//! Placement state machine
//!
//! Turns a stream of pointer events into a finished measurement. One
//! [`PlacementSession`] exists per project session and exactly one tool is
//! armed at a time. The in-progress primitive lives in the session as a
//! preview (never in the collection) until it is committed.
//!
//! Per-tool sequences:
//! - Distance, Rectangle, Circle: press, drag, release. The release commits
//!   only when the drag is longer than the commit threshold.
//! - Angle: press and drag the first leg, release, then move to aim the
//!   second leg and press again to commit.
//! - Polygon: one press per vertex; pressing near the first vertex closes
//!   and commits. [`PlacementSession::finish`] commits an open polygon.
//! - Guide line: a single press commits.

use crate::calibration::Calibration;
use crate::geometry::Point;
use crate::measurement::{
    GuideOrientation, Measurement, MeasurementKind, Shape, VertexOutcome,
    DEFAULT_CLOSING_TOLERANCE,
};

/// Default minimum drag length (in pixels) for a drag-placed primitive
pub const DEFAULT_DRAG_THRESHOLD: f64 = 5.0;

/// Screen-space thresholds used during placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementConfig {
    /// A drag must be strictly longer than this to commit
    pub drag_threshold: f64,
    /// Clicking strictly closer than this to the first vertex closes a polygon
    pub closing_tolerance: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            drag_threshold: DEFAULT_DRAG_THRESHOLD,
            closing_tolerance: DEFAULT_CLOSING_TOLERANCE,
        }
    }
}

/// Placement tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Distance,
    Angle,
    Rectangle,
    Circle,
    Polygon,
    GuideLine(GuideOrientation),
}

impl Tool {
    /// Kind of measurement this tool produces
    pub fn kind(self) -> MeasurementKind {
        match self {
            Tool::Distance => MeasurementKind::Distance,
            Tool::Angle => MeasurementKind::Angle,
            Tool::Rectangle => MeasurementKind::Rectangle,
            Tool::Circle => MeasurementKind::Circle,
            Tool::Polygon => MeasurementKind::Polygon,
            Tool::GuideLine(_) => MeasurementKind::GuideLine,
        }
    }
}

/// Where the placement session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementState {
    /// No tool armed
    None,
    /// Tool armed, waiting for the first press
    FirstPoint,
    /// Dragging out the second point of a two-point primitive
    Dragging,
    /// Dragging the first leg of an angle
    DraggingFirstLeg,
    /// First leg placed; the next press commits the angle
    AwaitingThirdPoint,
    /// Polygon has vertices and accepts more
    AwaitingVertex,
    /// Polygon just closed; the closing press has not been released yet
    Closed,
}

/// Pointer input in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up(Point),
    Cancel,
}

/// Why an in-progress primitive was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Drag did not exceed the commit threshold
    BelowThreshold,
    /// Explicit cancel
    Cancelled,
    /// Another tool was started
    Superseded,
    /// `finish` on a polygon with fewer than two vertices
    TooFewVertices,
}

/// Result of feeding one event to the session
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    /// Event had no effect
    Idle,
    /// The preview changed
    Updated,
    /// A finished primitive, ready to be registered in the collection
    Committed(Measurement),
    /// The in-progress primitive was discarded
    Aborted(AbortReason),
}

/// Transient state of one in-progress placement
#[derive(Debug, Clone)]
pub struct PlacementSession {
    config: PlacementConfig,
    tool: Option<Tool>,
    state: PlacementState,
    /// Primitive under construction
    preview: Option<Measurement>,
    /// Press location that started the current drag
    anchor: Option<Point>,
    /// Last cursor position, for the polygon rubber band
    cursor: Option<Point>,
    captured: bool,
}

impl Default for PlacementSession {
    fn default() -> Self {
        Self::new(PlacementConfig::default())
    }
}

impl PlacementSession {
    pub fn new(config: PlacementConfig) -> Self {
        Self {
            config,
            tool: None,
            state: PlacementState::None,
            preview: None,
            anchor: None,
            cursor: None,
            captured: false,
        }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn tool(&self) -> Option<Tool> {
        self.tool
    }

    pub fn state(&self) -> PlacementState {
        self.state
    }

    /// Primitive under construction, calibrated for display
    pub fn preview(&self) -> Option<&Measurement> {
        self.preview.as_ref()
    }

    /// Whether the session holds pointer capture
    pub fn captures_pointer(&self) -> bool {
        self.captured
    }

    /// Whether a primitive is partially placed
    pub fn is_in_progress(&self) -> bool {
        self.preview.is_some()
    }

    /// Preview edge from the last polygon vertex to the cursor
    pub fn rubber_band(&self) -> Option<(Point, Point)> {
        if self.state != PlacementState::AwaitingVertex {
            return None;
        }
        let Some(Shape::Polygon { vertices, .. }) = self.preview.as_ref().map(|m| m.shape())
        else {
            return None;
        };
        Some((*vertices.last()?, self.cursor?))
    }

    /// Arm `tool`, cancelling any placement already in progress
    ///
    /// Returns `Aborted(Superseded)` when a half-built primitive was dropped.
    pub fn begin(&mut self, tool: Tool) -> PlacementOutcome {
        let outcome = if self.is_in_progress() {
            self.reset(PlacementState::None);
            tracing::debug!(?tool, "placement superseded by new tool");
            PlacementOutcome::Aborted(AbortReason::Superseded)
        } else {
            PlacementOutcome::Idle
        };
        self.tool = Some(tool);
        self.state = PlacementState::FirstPoint;
        outcome
    }

    /// Drop any in-progress primitive, disarm the tool and release capture
    ///
    /// Always succeeds.
    pub fn cancel(&mut self) -> PlacementOutcome {
        let was_active = self.state != PlacementState::None;
        self.reset(PlacementState::None);
        self.tool = None;
        if was_active {
            tracing::debug!("placement cancelled");
            PlacementOutcome::Aborted(AbortReason::Cancelled)
        } else {
            PlacementOutcome::Idle
        }
    }

    /// Commit the polygon under construction as an open polygon
    pub fn finish(&mut self, calibration: &Calibration) -> PlacementOutcome {
        if self.state != PlacementState::AwaitingVertex {
            return PlacementOutcome::Idle;
        }
        let vertex_count = self
            .preview
            .as_ref()
            .map(|m| m.handle_points().len())
            .unwrap_or(0);
        if vertex_count < 2 {
            self.reset(PlacementState::FirstPoint);
            return PlacementOutcome::Aborted(AbortReason::TooFewVertices);
        }
        self.commit(calibration, PlacementState::FirstPoint)
    }

    /// Advance the state machine by one pointer event
    pub fn handle_pointer_event(
        &mut self,
        event: PointerEvent,
        calibration: &Calibration,
    ) -> PlacementOutcome {
        let Some(tool) = self.tool else {
            return PlacementOutcome::Idle;
        };

        match event {
            PointerEvent::Cancel => self.cancel(),
            PointerEvent::Down(point) => self.pointer_down(tool, point, calibration),
            PointerEvent::Move(point) => self.pointer_move(point, calibration),
            PointerEvent::Up(point) => self.pointer_up(point, calibration),
        }
    }

    fn pointer_down(
        &mut self,
        tool: Tool,
        point: Point,
        calibration: &Calibration,
    ) -> PlacementOutcome {
        match (tool, self.state) {
            (
                Tool::Distance | Tool::Rectangle | Tool::Circle,
                PlacementState::FirstPoint | PlacementState::Closed,
            ) => {
                self.start(tool.kind(), &[point, point], point, calibration);
                self.state = PlacementState::Dragging;
                PlacementOutcome::Updated
            }
            (Tool::Angle, PlacementState::FirstPoint | PlacementState::Closed) => {
                self.start(tool.kind(), &[point, point, point], point, calibration);
                self.state = PlacementState::DraggingFirstLeg;
                PlacementOutcome::Updated
            }
            (Tool::Angle, PlacementState::AwaitingThirdPoint) => {
                self.track(2, point);
                self.commit(calibration, PlacementState::FirstPoint)
            }
            (Tool::Polygon, PlacementState::FirstPoint | PlacementState::Closed) => {
                self.start(MeasurementKind::Polygon, &[point], point, calibration);
                self.cursor = Some(point);
                self.state = PlacementState::AwaitingVertex;
                PlacementOutcome::Updated
            }
            (Tool::Polygon, PlacementState::AwaitingVertex) => self.add_vertex(point, calibration),
            (Tool::GuideLine(orientation), PlacementState::FirstPoint | PlacementState::Closed) => {
                let mut guide =
                    Measurement::guide_line(orientation, orientation.coordinate_of(&point));
                guide.set_calibration(calibration.clone());
                self.preview = Some(guide);
                self.commit(calibration, PlacementState::FirstPoint)
            }
            _ => PlacementOutcome::Idle,
        }
    }

    fn pointer_move(&mut self, point: Point, calibration: &Calibration) -> PlacementOutcome {
        match self.state {
            PlacementState::Dragging => self.track(1, point),
            PlacementState::DraggingFirstLeg => self.track(0, point),
            PlacementState::AwaitingThirdPoint => self.track(2, point),
            PlacementState::AwaitingVertex => {
                self.cursor = Some(point);
                if let Some(preview) = self.preview.as_mut() {
                    preview.set_calibration(calibration.clone());
                }
                PlacementOutcome::Updated
            }
            _ => PlacementOutcome::Idle,
        }
    }

    fn pointer_up(&mut self, point: Point, calibration: &Calibration) -> PlacementOutcome {
        match self.state {
            PlacementState::Dragging => {
                self.track(1, point);
                let dragged = self
                    .anchor
                    .map(|anchor| anchor.distance_to(&point))
                    .unwrap_or(0.0);
                if dragged > self.config.drag_threshold {
                    self.commit(calibration, PlacementState::FirstPoint)
                } else {
                    tracing::debug!(dragged, "drag below commit threshold, discarded");
                    self.reset(PlacementState::FirstPoint);
                    PlacementOutcome::Aborted(AbortReason::BelowThreshold)
                }
            }
            PlacementState::DraggingFirstLeg => {
                // Capture stays: the angle is not finished until the next press.
                self.track(0, point);
                self.track(2, point);
                self.state = PlacementState::AwaitingThirdPoint;
                PlacementOutcome::Updated
            }
            PlacementState::Closed => {
                self.state = PlacementState::FirstPoint;
                PlacementOutcome::Idle
            }
            _ => PlacementOutcome::Idle,
        }
    }

    fn add_vertex(&mut self, point: Point, calibration: &Calibration) -> PlacementOutcome {
        let tolerance = self.config.closing_tolerance;
        let Some(preview) = self.preview.as_mut() else {
            return PlacementOutcome::Idle;
        };
        match preview.add_vertex(point, tolerance) {
            Ok(VertexOutcome::Appended(_)) => {
                self.cursor = Some(point);
                PlacementOutcome::Updated
            }
            Ok(VertexOutcome::Closed) => self.commit(calibration, PlacementState::Closed),
            Ok(VertexOutcome::AlreadyClosed) => PlacementOutcome::Idle,
            Err(err) => {
                tracing::warn!(%err, "polygon preview rejected vertex");
                PlacementOutcome::Idle
            }
        }
    }

    fn start(
        &mut self,
        kind: MeasurementKind,
        points: &[Point],
        anchor: Point,
        calibration: &Calibration,
    ) {
        match Measurement::create(kind, points) {
            Ok(mut preview) => {
                preview.set_calibration(calibration.clone());
                self.preview = Some(preview);
                self.anchor = Some(anchor);
                self.captured = true;
            }
            Err(err) => tracing::warn!(%err, "could not start placement"),
        }
    }

    fn track(&mut self, index: usize, point: Point) -> PlacementOutcome {
        let Some(preview) = self.preview.as_mut() else {
            return PlacementOutcome::Idle;
        };
        match preview.move_point(index, point) {
            Ok(()) => PlacementOutcome::Updated,
            Err(err) => {
                tracing::warn!(%err, "preview update rejected");
                PlacementOutcome::Idle
            }
        }
    }

    fn commit(&mut self, calibration: &Calibration, next: PlacementState) -> PlacementOutcome {
        let preview = self.preview.take();
        self.reset(next);
        match preview {
            Some(mut measurement) => {
                measurement.set_calibration(calibration.clone());
                tracing::debug!(
                    kind = %measurement.kind(),
                    id = %measurement.id(),
                    value = measurement.display_text(),
                    "placement committed"
                );
                PlacementOutcome::Committed(measurement)
            }
            None => PlacementOutcome::Idle,
        }
    }

    fn reset(&mut self, state: PlacementState) {
        self.preview = None;
        self.anchor = None;
        self.cursor = None;
        self.captured = false;
        self.state = state;
    }
}
