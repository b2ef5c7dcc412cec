//! Measurement primitives
//!
//! A [`Measurement`] is one typed, geometry-bearing annotation on the image.
//! The kind-specific payload lives in [`Shape`]; everything shared by all
//! kinds (id, calibration, style, selection flags, derived values and the
//! display text) lives on the measurement itself.
//!
//! Derived values are recomputed synchronously on every geometry or
//! calibration change, so callers can render immediately after a mutation.

use crate::calibration::Calibration;
use crate::error::{Arity, MeasurementError, MeasurementResult};
use crate::geometry::{self, CircleMetrics, Point, RectangleMetrics};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for measurements
///
/// Stable across the project lifetime and persisted in project files.
pub type MeasurementId = uuid::Uuid;

/// Default distance (in pixels) within which a click on the first polygon
/// vertex closes the polygon
pub const DEFAULT_CLOSING_TOLERANCE: f64 = 10.0;

/// Kind of measurement primitive
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementKind {
    /// Point-to-point distance
    Distance,
    /// Three-point angle
    Angle,
    /// Axis-aligned rectangle
    Rectangle,
    /// Circle from center and edge point
    Circle,
    /// Open or closed polygon
    Polygon,
    /// Infinite horizontal or vertical reference line
    GuideLine,
}

impl MeasurementKind {
    /// Every kind, in collection order
    pub const ALL: [MeasurementKind; 6] = [
        MeasurementKind::Distance,
        MeasurementKind::Angle,
        MeasurementKind::Rectangle,
        MeasurementKind::Circle,
        MeasurementKind::Polygon,
        MeasurementKind::GuideLine,
    ];

    /// Position of this kind in [`MeasurementKind::ALL`]
    pub fn index(self) -> usize {
        match self {
            MeasurementKind::Distance => 0,
            MeasurementKind::Angle => 1,
            MeasurementKind::Rectangle => 2,
            MeasurementKind::Circle => 3,
            MeasurementKind::Polygon => 4,
            MeasurementKind::GuideLine => 5,
        }
    }

    /// Number of defining points accepted by [`Measurement::create`]
    pub fn arity(self) -> Arity {
        match self {
            MeasurementKind::Distance => Arity::Exactly(2),
            MeasurementKind::Angle => Arity::Exactly(3),
            MeasurementKind::Rectangle => Arity::Exactly(2),
            MeasurementKind::Circle => Arity::Exactly(2),
            MeasurementKind::Polygon => Arity::AtLeast(0),
            MeasurementKind::GuideLine => Arity::Scalar,
        }
    }

    /// Lowercase name used in file formats and the CLI
    pub fn name(self) -> &'static str {
        match self {
            MeasurementKind::Distance => "distance",
            MeasurementKind::Angle => "angle",
            MeasurementKind::Rectangle => "rectangle",
            MeasurementKind::Circle => "circle",
            MeasurementKind::Polygon => "polygon",
            MeasurementKind::GuideLine => "guide-line",
        }
    }
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MeasurementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasurementKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown measurement kind: {s}"))
    }
}

/// Axis a guide line runs along
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GuideOrientation {
    /// Constant Y, spans the full image width
    Horizontal,
    /// Constant X, spans the full image height
    Vertical,
}

impl GuideOrientation {
    /// The coordinate of `point` that positions a guide of this orientation
    pub fn coordinate_of(self, point: &Point) -> f64 {
        match self {
            GuideOrientation::Horizontal => point.y,
            GuideOrientation::Vertical => point.x,
        }
    }
}

/// Kind-specific defining geometry, in pixel space
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Shape {
    Distance {
        p0: Point,
        p1: Point,
    },
    Angle {
        p0: Point,
        vertex: Point,
        p1: Point,
    },
    Rectangle {
        top_left: Point,
        bottom_right: Point,
    },
    Circle {
        center: Point,
        edge: Point,
    },
    Polygon {
        vertices: Vec<Point>,
        is_closed: bool,
    },
    GuideLine {
        orientation: GuideOrientation,
        position: f64,
    },
}

impl Shape {
    /// Kind tag of this shape
    pub fn kind(&self) -> MeasurementKind {
        match self {
            Shape::Distance { .. } => MeasurementKind::Distance,
            Shape::Angle { .. } => MeasurementKind::Angle,
            Shape::Rectangle { .. } => MeasurementKind::Rectangle,
            Shape::Circle { .. } => MeasurementKind::Circle,
            Shape::Polygon { .. } => MeasurementKind::Polygon,
            Shape::GuideLine { .. } => MeasurementKind::GuideLine,
        }
    }

    /// Defining points in `move_point` index order
    ///
    /// Guide lines have no point handles; they are moved through index 0.
    pub fn points(&self) -> Vec<Point> {
        match self {
            Shape::Distance { p0, p1 } => vec![*p0, *p1],
            Shape::Angle { p0, vertex, p1 } => vec![*p0, *vertex, *p1],
            Shape::Rectangle {
                top_left,
                bottom_right,
            } => vec![*top_left, *bottom_right],
            Shape::Circle { center, edge } => vec![*center, *edge],
            Shape::Polygon { vertices, .. } => vertices.clone(),
            Shape::GuideLine { .. } => Vec::new(),
        }
    }

    /// Polygons flagged closed with fewer than three vertices are reopened
    fn normalized(mut self) -> Self {
        if let Shape::Polygon {
            vertices,
            is_closed,
        } = &mut self
        {
            if vertices.len() < 3 {
                *is_closed = false;
            }
        }
        self
    }
}

/// Derived values of a shape
///
/// Produced in pixel space by [`Metrics::of`] and converted to real-world
/// units with [`Metrics::calibrated`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metrics {
    Distance { length: f64 },
    Angle { degrees: f64 },
    Rectangle(RectangleMetrics),
    Circle(CircleMetrics),
    Polygon { perimeter: f64, area: Option<f64> },
    GuideLine { position: f64 },
}

impl Metrics {
    /// Compute pixel-space metrics for `shape`
    pub fn of(shape: &Shape) -> Metrics {
        match shape {
            Shape::Distance { p0, p1 } => Metrics::Distance {
                length: geometry::segment_length(p0, p1),
            },
            Shape::Angle { p0, vertex, p1 } => Metrics::Angle {
                degrees: geometry::angle_degrees(p0, vertex, p1),
            },
            Shape::Rectangle {
                top_left,
                bottom_right,
            } => Metrics::Rectangle(geometry::rectangle_metrics(top_left, bottom_right)),
            Shape::Circle { center, edge } => {
                Metrics::Circle(geometry::circle_metrics(center, edge))
            }
            Shape::Polygon {
                vertices,
                is_closed,
            } => Metrics::Polygon {
                perimeter: geometry::polygon_perimeter(vertices, *is_closed),
                area: is_closed.then(|| geometry::polygon_area(vertices)),
            },
            Shape::GuideLine { position, .. } => Metrics::GuideLine {
                position: *position,
            },
        }
    }

    /// Convert to real-world units: lengths scale linearly, areas
    /// quadratically, angles not at all
    pub fn calibrated(&self, calibration: &Calibration) -> Metrics {
        let len = |v: f64| calibration.to_real_length(v);
        let area = |v: f64| calibration.to_real_area(v);
        match *self {
            Metrics::Distance { length } => Metrics::Distance {
                length: len(length),
            },
            Metrics::Angle { degrees } => Metrics::Angle { degrees },
            Metrics::Rectangle(m) => Metrics::Rectangle(RectangleMetrics {
                width: len(m.width),
                height: len(m.height),
                area: area(m.area),
                perimeter: len(m.perimeter),
            }),
            Metrics::Circle(m) => Metrics::Circle(CircleMetrics {
                radius: len(m.radius),
                diameter: len(m.diameter),
                circumference: len(m.circumference),
                area: area(m.area),
            }),
            Metrics::Polygon { perimeter, area: a } => Metrics::Polygon {
                perimeter: len(perimeter),
                area: a.map(area),
            },
            Metrics::GuideLine { position } => Metrics::GuideLine {
                position: len(position),
            },
        }
    }
}

/// RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new color
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 200, 0);
    pub const BLUE: Color = Color::rgb(0, 120, 255);
    pub const YELLOW: Color = Color::rgb(255, 220, 0);
    pub const MAGENTA: Color = Color::rgb(255, 0, 255);
}

/// Display color and stroke thickness of a measurement
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MeasurementStyle {
    pub color: Color,
    /// Stroke thickness in screen pixels
    pub thickness: f32,
}

impl Default for MeasurementStyle {
    fn default() -> Self {
        Self {
            color: Color::YELLOW,
            thickness: 2.0,
        }
    }
}

/// Result of adding a vertex to a polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexOutcome {
    /// The point was appended at this vertex index
    Appended(usize),
    /// The point hit the first vertex and the polygon closed
    Closed,
    /// The polygon was already closed; nothing changed
    AlreadyClosed,
}

/// A measurement primitive with its calibration and derived values
///
/// Equality ignores the editor flags (`selected`, `editing`); they are not
/// persisted and never part of an undoable state.
#[derive(Debug, Clone)]
pub struct Measurement {
    /// Unique identifier
    id: MeasurementId,
    /// Defining geometry (pixel space)
    shape: Shape,
    /// Copy of the project calibration, kept current by the broadcaster
    calibration: Calibration,
    /// Display color and thickness
    style: MeasurementStyle,
    /// Selected in the editor
    selected: bool,
    /// A handle is being dragged
    editing: bool,
    /// Pixel-space derived values
    metrics: Metrics,
    /// Formatted value with units
    display_text: String,
}

impl PartialEq for Measurement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.shape == other.shape
            && self.calibration == other.calibration
            && self.style == other.style
            && self.metrics == other.metrics
            && self.display_text == other.display_text
    }
}

impl Measurement {
    /// Create a measurement of `kind` from its defining points
    ///
    /// Point counts: Distance 2, Angle 3, Rectangle 2, Circle 2, Polygon any
    /// (an open polygon). Guide lines are positioned by a scalar; use
    /// [`Measurement::guide_line`].
    pub fn create(kind: MeasurementKind, points: &[Point]) -> MeasurementResult<Self> {
        let arity = kind.arity();
        if !arity.accepts(points.len()) {
            return Err(MeasurementError::InvalidArity {
                kind,
                expected: arity,
                got: points.len(),
            });
        }

        let shape = match kind {
            MeasurementKind::Distance => Shape::Distance {
                p0: points[0],
                p1: points[1],
            },
            MeasurementKind::Angle => Shape::Angle {
                p0: points[0],
                vertex: points[1],
                p1: points[2],
            },
            MeasurementKind::Rectangle => Shape::Rectangle {
                top_left: points[0],
                bottom_right: points[1],
            },
            MeasurementKind::Circle => Shape::Circle {
                center: points[0],
                edge: points[1],
            },
            MeasurementKind::Polygon => Shape::Polygon {
                vertices: points.to_vec(),
                is_closed: false,
            },
            MeasurementKind::GuideLine => unreachable!("guide lines have scalar arity"),
        };
        Ok(Self::from_shape(shape))
    }

    /// Create a guide line at `position` along the perpendicular axis
    pub fn guide_line(orientation: GuideOrientation, position: f64) -> Self {
        Self::from_shape(Shape::GuideLine {
            orientation,
            position,
        })
    }

    /// Create a measurement from existing geometry with a fresh id
    pub fn from_shape(shape: Shape) -> Self {
        Self::with_id(MeasurementId::new_v4(), shape)
    }

    /// Create a measurement with a known id (used when loading projects)
    pub fn with_id(id: MeasurementId, shape: Shape) -> Self {
        let shape = shape.normalized();
        let calibration = Calibration::default();
        let metrics = Metrics::of(&shape);
        let display_text = format_display(&shape, &metrics, &calibration);
        Self {
            id,
            shape,
            calibration,
            style: MeasurementStyle::default(),
            selected: false,
            editing: false,
            metrics,
            display_text,
        }
    }

    /// Builder-style style override
    pub fn with_style(mut self, style: MeasurementStyle) -> Self {
        self.style = style;
        self
    }

    pub fn id(&self) -> MeasurementId {
        self.id
    }

    pub fn kind(&self) -> MeasurementKind {
        self.shape.kind()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The calibration this measurement is currently displayed with
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn style(&self) -> &MeasurementStyle {
        &self.style
    }

    pub fn set_style(&mut self, style: MeasurementStyle) {
        self.style = style;
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn set_editing(&mut self, editing: bool) {
        self.editing = editing;
    }

    /// Derived values in pixel space
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Derived values in calibrated real-world units
    pub fn real_metrics(&self) -> Metrics {
        self.metrics.calibrated(&self.calibration)
    }

    /// Formatted value with units, e.g. `"12.50 cm"`
    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    /// Move one defining point and recompute everything derived from it
    ///
    /// For guide lines index 0 repositions the line to the matching
    /// coordinate of `point`.
    pub fn move_point(&mut self, index: usize, point: Point) -> MeasurementResult<()> {
        let count = self.point_count();
        let out_of_range = MeasurementError::PointIndexOutOfRange { index, count };
        match &mut self.shape {
            Shape::Distance { p0, p1 } => match index {
                0 => *p0 = point,
                1 => *p1 = point,
                _ => return Err(out_of_range),
            },
            Shape::Angle { p0, vertex, p1 } => match index {
                0 => *p0 = point,
                1 => *vertex = point,
                2 => *p1 = point,
                _ => return Err(out_of_range),
            },
            Shape::Rectangle {
                top_left,
                bottom_right,
            } => match index {
                0 => *top_left = point,
                1 => *bottom_right = point,
                _ => return Err(out_of_range),
            },
            Shape::Circle { center, edge } => match index {
                0 => *center = point,
                1 => *edge = point,
                _ => return Err(out_of_range),
            },
            Shape::Polygon { vertices, .. } => match vertices.get_mut(index) {
                Some(vertex) => *vertex = point,
                None => return Err(out_of_range),
            },
            Shape::GuideLine {
                orientation,
                position,
            } => match index {
                0 => *position = orientation.coordinate_of(&point),
                _ => return Err(out_of_range),
            },
        }
        self.recompute();
        Ok(())
    }

    /// Move the whole primitive by `(dx, dy)`
    pub fn translate(&mut self, dx: f64, dy: f64) {
        match &mut self.shape {
            Shape::Distance { p0, p1 } => {
                *p0 = p0.translated(dx, dy);
                *p1 = p1.translated(dx, dy);
            }
            Shape::Angle { p0, vertex, p1 } => {
                *p0 = p0.translated(dx, dy);
                *vertex = vertex.translated(dx, dy);
                *p1 = p1.translated(dx, dy);
            }
            Shape::Rectangle {
                top_left,
                bottom_right,
            } => {
                *top_left = top_left.translated(dx, dy);
                *bottom_right = bottom_right.translated(dx, dy);
            }
            Shape::Circle { center, edge } => {
                *center = center.translated(dx, dy);
                *edge = edge.translated(dx, dy);
            }
            Shape::Polygon { vertices, .. } => {
                for v in vertices.iter_mut() {
                    *v = v.translated(dx, dy);
                }
            }
            Shape::GuideLine {
                orientation,
                position,
            } => {
                *position += match orientation {
                    GuideOrientation::Horizontal => dy,
                    GuideOrientation::Vertical => dx,
                };
            }
        }
        self.recompute();
    }

    /// Apply a new calibration; geometry is untouched
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
        self.display_text = format_display(&self.shape, &self.metrics, &self.calibration);
    }

    /// Add a vertex to a polygon, closing it when `point` lands strictly
    /// within `closing_tolerance` of the first vertex and at least three
    /// vertices already exist
    pub fn add_vertex(
        &mut self,
        point: Point,
        closing_tolerance: f64,
    ) -> MeasurementResult<VertexOutcome> {
        let kind = self.kind();
        let Shape::Polygon {
            vertices,
            is_closed,
        } = &mut self.shape
        else {
            return Err(MeasurementError::NotAPolygon(kind));
        };

        if *is_closed {
            return Ok(VertexOutcome::AlreadyClosed);
        }

        let closes = vertices.len() >= 3
            && vertices
                .first()
                .is_some_and(|first| first.distance_to(&point) < closing_tolerance);

        let outcome = if closes {
            *is_closed = true;
            VertexOutcome::Closed
        } else {
            vertices.push(point);
            VertexOutcome::Appended(vertices.len() - 1)
        };
        self.recompute();
        Ok(outcome)
    }

    /// Draggable defining points, in `move_point` index order
    pub fn handle_points(&self) -> Vec<Point> {
        self.shape.points()
    }

    /// Index of the handle nearest to `point` within `tolerance`
    ///
    /// A guide line is hit anywhere along its length and reports index 0.
    pub fn hit_handle(&self, point: &Point, tolerance: f64) -> Option<usize> {
        if let Shape::GuideLine {
            orientation,
            position,
        } = &self.shape
        {
            let offset = (orientation.coordinate_of(point) - position).abs();
            return (offset <= tolerance).then_some(0);
        }

        self.handle_points()
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.distance_to(point)))
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    }

    /// Where the value label should be drawn
    pub fn label_position(&self) -> Point {
        match &self.shape {
            Shape::Distance { p0, p1 } => p0.midpoint(p1),
            Shape::Angle { vertex, .. } => *vertex,
            Shape::Rectangle {
                top_left,
                bottom_right,
            } => top_left.midpoint(bottom_right),
            Shape::Circle { center, .. } => *center,
            Shape::Polygon { vertices, .. } => geometry::centroid(vertices).unwrap_or_default(),
            Shape::GuideLine {
                orientation,
                position,
            } => match orientation {
                GuideOrientation::Horizontal => Point::new(0.0, *position),
                GuideOrientation::Vertical => Point::new(*position, 0.0),
            },
        }
    }

    fn point_count(&self) -> usize {
        match &self.shape {
            Shape::GuideLine { .. } => 1,
            shape => shape.points().len(),
        }
    }

    fn recompute(&mut self) {
        self.metrics = Metrics::of(&self.shape);
        self.display_text = format_display(&self.shape, &self.metrics, &self.calibration);
    }
}

/// Format the value label of a shape under `calibration`
fn format_display(shape: &Shape, metrics: &Metrics, calibration: &Calibration) -> String {
    let u = calibration.units();
    match (shape, metrics.calibrated(calibration)) {
        (_, Metrics::Distance { length }) => format!("{length:.2} {u}"),
        (_, Metrics::Angle { degrees }) => format!("{degrees:.1}°"),
        (_, Metrics::Rectangle(m)) => {
            format!("{:.2} × {:.2} {u} ({:.2} {u}²)", m.width, m.height, m.area)
        }
        (_, Metrics::Circle(m)) => format!("r = {:.2} {u} ({:.2} {u}²)", m.radius, m.area),
        (_, Metrics::Polygon { perimeter, area }) => match area {
            Some(area) => format!("{perimeter:.2} {u} ({area:.2} {u}²)"),
            None => format!("{perimeter:.2} {u}"),
        },
        (Shape::GuideLine { orientation, .. }, Metrics::GuideLine { position }) => {
            let axis = match orientation {
                GuideOrientation::Horizontal => "y",
                GuideOrientation::Vertical => "x",
            };
            format!("{axis} = {position:.2} {u}")
        }
        (_, Metrics::GuideLine { position }) => format!("{position:.2} {u}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cm() -> Calibration {
        Calibration::new(0.1, "cm").unwrap()
    }

    fn sample(kind: MeasurementKind) -> Measurement {
        match kind {
            MeasurementKind::Distance => Measurement::create(
                kind,
                &[Point::new(0.0, 0.0), Point::new(30.0, 40.0)],
            ),
            MeasurementKind::Angle => Measurement::create(
                kind,
                &[Point::new(10.0, 0.0), Point::new(0.0, 0.0), Point::new(0.0, 10.0)],
            ),
            MeasurementKind::Rectangle => Measurement::create(
                kind,
                &[Point::new(0.0, 0.0), Point::new(100.0, 50.0)],
            ),
            MeasurementKind::Circle => Measurement::create(
                kind,
                &[Point::new(50.0, 50.0), Point::new(60.0, 50.0)],
            ),
            MeasurementKind::Polygon => Measurement::create(
                kind,
                &[Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)],
            ),
            MeasurementKind::GuideLine => Ok(Measurement::guide_line(GuideOrientation::Vertical, 42.0)),
        }
        .unwrap()
    }

    #[test]
    fn test_create_validates_arity() {
        let err = Measurement::create(MeasurementKind::Angle, &[Point::new(0.0, 0.0)]).unwrap_err();
        assert_eq!(
            err,
            MeasurementError::InvalidArity {
                kind: MeasurementKind::Angle,
                expected: Arity::Exactly(3),
                got: 1,
            }
        );
        assert!(Measurement::create(MeasurementKind::Distance, &[]).is_err());
        assert!(Measurement::create(MeasurementKind::GuideLine, &[Point::new(1.0, 1.0)]).is_err());
        assert!(Measurement::create(MeasurementKind::Polygon, &[]).is_ok());
    }

    #[test]
    fn test_rectangle_with_calibration() {
        let mut rect = Measurement::create(
            MeasurementKind::Rectangle,
            &[Point::new(0.0, 0.0), Point::new(100.0, 50.0)],
        )
        .unwrap();
        rect.set_calibration(cm());

        let Metrics::Rectangle(m) = rect.real_metrics() else {
            panic!("expected rectangle metrics");
        };
        assert!((m.width - 10.0).abs() < 1e-9);
        assert!((m.height - 5.0).abs() < 1e-9);
        assert!((m.area - 50.0).abs() < 1e-9);
        assert_eq!(rect.display_text(), "10.00 × 5.00 cm (50.00 cm²)");
    }

    #[test]
    fn test_angle_ninety_degrees() {
        let angle = Measurement::create(
            MeasurementKind::Angle,
            &[Point::new(1.0, 0.0), Point::new(0.0, 0.0), Point::new(0.0, 1.0)],
        )
        .unwrap();
        let Metrics::Angle { degrees } = *angle.metrics() else {
            panic!("expected angle metrics");
        };
        assert!((degrees - 90.0).abs() < 1e-9);
        assert_eq!(angle.display_text(), "90.0°");
    }

    #[test]
    fn test_degenerate_angle_reports_zero() {
        let p = Point::new(5.0, 5.0);
        let angle =
            Measurement::create(MeasurementKind::Angle, &[p, p, Point::new(9.0, 9.0)]).unwrap();
        assert_eq!(*angle.metrics(), Metrics::Angle { degrees: 0.0 });
    }

    #[test]
    fn test_polygon_closes_near_first_vertex() {
        let mut polygon = Measurement::create(MeasurementKind::Polygon, &[]).unwrap();
        for p in [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ] {
            assert!(matches!(
                polygon.add_vertex(p, DEFAULT_CLOSING_TOLERANCE),
                Ok(VertexOutcome::Appended(_))
            ));
        }

        let outcome = polygon.add_vertex(Point::new(0.5, 0.5), DEFAULT_CLOSING_TOLERANCE);
        assert_eq!(outcome, Ok(VertexOutcome::Closed));
        assert_eq!(
            *polygon.metrics(),
            Metrics::Polygon {
                perimeter: 40.0,
                area: Some(100.0)
            }
        );
        assert_eq!(polygon.handle_points().len(), 4);
        assert_eq!(
            polygon.add_vertex(Point::new(50.0, 50.0), DEFAULT_CLOSING_TOLERANCE),
            Ok(VertexOutcome::AlreadyClosed)
        );
    }

    #[test]
    fn test_polygon_does_not_close_with_two_vertices() {
        let mut polygon = Measurement::create(
            MeasurementKind::Polygon,
            &[Point::new(0.0, 0.0), Point::new(20.0, 0.0)],
        )
        .unwrap();
        let outcome = polygon.add_vertex(Point::new(1.0, 1.0), DEFAULT_CLOSING_TOLERANCE);
        assert_eq!(outcome, Ok(VertexOutcome::Appended(2)));
    }

    #[test]
    fn test_add_vertex_rejects_non_polygon() {
        let mut distance = sample(MeasurementKind::Distance);
        assert_eq!(
            distance.add_vertex(Point::new(0.0, 0.0), 10.0),
            Err(MeasurementError::NotAPolygon(MeasurementKind::Distance))
        );
    }

    #[test]
    fn test_move_point_recomputes_immediately() {
        let mut distance = sample(MeasurementKind::Distance);
        assert_eq!(distance.display_text(), "50.00 px");

        distance.move_point(1, Point::new(0.0, 80.0)).unwrap();
        assert_eq!(*distance.metrics(), Metrics::Distance { length: 80.0 });
        assert_eq!(distance.display_text(), "80.00 px");

        assert_eq!(
            distance.move_point(2, Point::new(0.0, 0.0)),
            Err(MeasurementError::PointIndexOutOfRange { index: 2, count: 2 })
        );
    }

    #[test]
    fn test_move_point_and_calibration_commute() {
        let target = Point::new(77.0, 13.0);
        for kind in MeasurementKind::ALL {
            let mut a = sample(kind);
            let mut b = a.clone();

            a.move_point(0, target).unwrap();
            a.set_calibration(cm());

            b.set_calibration(cm());
            b.move_point(0, target).unwrap();

            assert_eq!(a.shape(), b.shape(), "{kind}");
            assert_eq!(a.metrics(), b.metrics(), "{kind}");
            assert_eq!(a.display_text(), b.display_text(), "{kind}");
        }
    }

    #[test]
    fn test_set_calibration_keeps_geometry() {
        let mut circle = sample(MeasurementKind::Circle);
        let before = circle.shape().clone();
        circle.set_calibration(cm());
        assert_eq!(circle.shape(), &before);
        assert_eq!(circle.display_text(), "r = 1.00 cm (3.14 cm²)");
    }

    #[test]
    fn test_guide_line_moves_along_its_axis() {
        let mut guide = Measurement::guide_line(GuideOrientation::Horizontal, 20.0);
        guide.move_point(0, Point::new(300.0, 45.0)).unwrap();
        assert_eq!(*guide.metrics(), Metrics::GuideLine { position: 45.0 });
        assert_eq!(guide.display_text(), "y = 45.00 px");

        guide.translate(100.0, 5.0);
        assert_eq!(*guide.metrics(), Metrics::GuideLine { position: 50.0 });

        assert_eq!(guide.hit_handle(&Point::new(999.0, 53.0), 4.0), Some(0));
        assert_eq!(guide.hit_handle(&Point::new(999.0, 60.0), 4.0), None);
    }

    #[test]
    fn test_hit_handle_picks_nearest() {
        let rect = sample(MeasurementKind::Rectangle);
        assert_eq!(rect.hit_handle(&Point::new(98.0, 49.0), 5.0), Some(1));
        assert_eq!(rect.hit_handle(&Point::new(1.0, 1.0), 5.0), Some(0));
        assert_eq!(rect.hit_handle(&Point::new(50.0, 25.0), 5.0), None);
    }

    #[test]
    fn test_translate_preserves_metrics() {
        let mut polygon = sample(MeasurementKind::Polygon);
        let before = *polygon.metrics();
        polygon.translate(-5.0, 12.0);
        assert_eq!(*polygon.metrics(), before);
        assert_eq!(polygon.handle_points()[0], Point::new(-5.0, 12.0));
    }

    #[test]
    fn test_label_positions() {
        assert_eq!(
            sample(MeasurementKind::Distance).label_position(),
            Point::new(15.0, 20.0)
        );
        assert_eq!(
            sample(MeasurementKind::Rectangle).label_position(),
            Point::new(50.0, 25.0)
        );
        assert_eq!(
            sample(MeasurementKind::Angle).label_position(),
            Point::new(0.0, 0.0)
        );
    }

    #[test]
    fn test_closed_flag_requires_three_vertices() {
        let polygon = Measurement::from_shape(Shape::Polygon {
            vertices: vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)],
            is_closed: true,
        });
        assert_eq!(
            polygon.shape(),
            &Shape::Polygon {
                vertices: vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)],
                is_closed: false,
            }
        );
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in MeasurementKind::ALL {
            assert_eq!(kind.name().parse::<MeasurementKind>(), Ok(kind));
            assert_eq!(MeasurementKind::ALL[kind.index()], kind);
        }
        assert!("ellipse".parse::<MeasurementKind>().is_err());
    }
}
