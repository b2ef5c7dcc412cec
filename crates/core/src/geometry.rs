//! Geometry primitives and per-shape math
//!
//! Pure value types used by every measurement. All coordinates are in image
//! pixel space: origin at the top-left corner, X to the right, Y downward.
//! Nothing in this module knows about calibration; callers scale the results.

/// Immutable pixel-space coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a new point
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point
    pub fn distance_to(&self, other: &Point) -> f64 {
        (*other - *self).length()
    }

    /// Point halfway between `self` and `other`
    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Return this point offset by `(dx, dy)`
    pub fn translated(&self, dx: f64, dy: f64) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Return this point with both coordinates multiplied per axis
    pub fn scaled(&self, sx: f64, sy: f64) -> Point {
        Point::new(self.x * sx, self.y * sy)
    }
}

impl std::ops::Sub for Point {
    type Output = Vector;

    fn sub(self, rhs: Point) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Add<Vector> for Point {
    type Output = Point;

    fn add(self, rhs: Vector) -> Point {
        Point::new(self.x + rhs.dx, self.y + rhs.dy)
    }
}

/// Displacement between two points
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
}

impl Vector {
    /// Create a new vector
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Euclidean length
    pub fn length(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    /// Dot product
    pub fn dot(&self, other: &Vector) -> f64 {
        self.dx * other.dx + self.dy * other.dy
    }

    /// Z component of the 3-D cross product
    pub fn cross(&self, other: &Vector) -> f64 {
        self.dx * other.dy - self.dy * other.dx
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    /// Smallest box containing every point, `None` for an empty slice
    pub fn from_points(points: &[Point]) -> Option<Bounds> {
        let first = points.first()?;
        let mut bounds = Bounds { min: *first, max: *first };
        for p in &points[1..] {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// Length of the segment `p0`-`p1`
pub fn segment_length(p0: &Point, p1: &Point) -> f64 {
    p0.distance_to(p1)
}

/// Angle at `vertex` between the legs towards `p0` and `p1`, in degrees
///
/// Uses `atan2(|cross|, dot)` so the result is always within [0°, 180°].
/// A zero-length leg has no direction; the angle is reported as 0°.
pub fn angle_degrees(p0: &Point, vertex: &Point, p1: &Point) -> f64 {
    let a = *p0 - *vertex;
    let b = *p1 - *vertex;
    if a.length() == 0.0 || b.length() == 0.0 {
        return 0.0;
    }
    a.cross(&b).abs().atan2(a.dot(&b)).to_degrees().clamp(0.0, 180.0)
}

/// Derived values of an axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectangleMetrics {
    pub width: f64,
    pub height: f64,
    pub area: f64,
    pub perimeter: f64,
}

/// Rectangle metrics from two opposite corners (order-independent)
pub fn rectangle_metrics(top_left: &Point, bottom_right: &Point) -> RectangleMetrics {
    let width = (bottom_right.x - top_left.x).abs();
    let height = (bottom_right.y - top_left.y).abs();
    RectangleMetrics {
        width,
        height,
        area: width * height,
        perimeter: 2.0 * (width + height),
    }
}

/// Derived values of a circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleMetrics {
    pub radius: f64,
    pub diameter: f64,
    pub circumference: f64,
    pub area: f64,
}

/// Circle metrics from its center and any point on its edge
pub fn circle_metrics(center: &Point, edge: &Point) -> CircleMetrics {
    let radius = center.distance_to(edge);
    CircleMetrics {
        radius,
        diameter: 2.0 * radius,
        circumference: 2.0 * std::f64::consts::PI * radius,
        area: std::f64::consts::PI * radius * radius,
    }
}

/// Sum of edge lengths, including the closing edge when `closed`
pub fn polygon_perimeter(vertices: &[Point], closed: bool) -> f64 {
    let open: f64 = vertices.windows(2).map(|w| w[0].distance_to(&w[1])).sum();
    match (closed, vertices.first(), vertices.last()) {
        (true, Some(first), Some(last)) if vertices.len() > 2 => open + last.distance_to(first),
        _ => open,
    }
}

/// Enclosed area using the shoelace formula
///
/// Returns 0 for fewer than three vertices.
pub fn polygon_area(vertices: &[Point]) -> f64 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += vertices[i].x * vertices[j].y;
        area -= vertices[j].x * vertices[i].y;
    }
    (area / 2.0).abs()
}

/// Arithmetic mean of the vertices
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.x).sum();
    let sum_y: f64 = points.iter().map(|p| p.y).sum();
    Some(Point::new(sum_x / n, sum_y / n))
}
