//! Quadrilateral detection results
//!
//! Detection itself is done by a [`ShapeDetector`] collaborator working at
//! its own resolution. This module ranks its candidates and maps a chosen
//! candidate into display coordinates as a closed four-vertex polygon.

use crate::geometry::{self, Bounds, Point};
use crate::measurement::{Measurement, Shape};
use crate::project::ImageSize;
use std::path::Path;

/// Weight of normalized area in the ranking score
pub const AREA_WEIGHT: f64 = 0.6;
/// Weight of rectangularity in the ranking score
pub const RECTANGULARITY_WEIGHT: f64 = 0.4;

/// One detected quadrilateral, corners in detector-resolution pixels
#[derive(Debug, Clone, PartialEq)]
pub struct QuadCandidate {
    pub corners: [Point; 4],
    pub confidence: f64,
}

impl QuadCandidate {
    pub fn area(&self) -> f64 {
        geometry::polygon_area(&self.corners)
    }

    /// Quad area over the area of its axis-aligned bounding box (0..=1)
    pub fn rectangularity(&self) -> f64 {
        match Bounds::from_points(&self.corners) {
            Some(bounds) if bounds.area() > 0.0 => self.area() / bounds.area(),
            _ => 0.0,
        }
    }

    /// `0.6 * normalizedArea + 0.4 * rectangularity`
    pub fn score(&self, detector_size: ImageSize) -> f64 {
        let image_area = detector_size.area();
        let normalized_area = if image_area > 0.0 {
            self.area() / image_area
        } else {
            0.0
        };
        AREA_WEIGHT * normalized_area + RECTANGULARITY_WEIGHT * self.rectangularity()
    }
}

/// Everything a detector returns for one image
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionReport {
    /// Resolution the detector worked at
    pub detector_size: ImageSize,
    pub candidates: Vec<QuadCandidate>,
    /// Whether `candidates` is already in preference order
    pub pre_ranked: bool,
}

impl DetectionReport {
    /// Candidates best first
    ///
    /// Pre-ranked reports keep their order; otherwise candidates are sorted
    /// by [`QuadCandidate::score`], ties keeping detector order.
    pub fn ranked(&self) -> Vec<QuadCandidate> {
        let mut candidates = self.candidates.clone();
        if !self.pre_ranked {
            let size = self.detector_size;
            candidates.sort_by(|a, b| b.score(size).total_cmp(&a.score(size)));
        }
        candidates
    }
}

/// Finds quadrilaterals (documents, boards, panels) in an image
pub trait ShapeDetector {
    type Error: std::error::Error + Send + Sync + 'static;

    fn detect(
        &self,
        path: &Path,
        min_area_fraction: f64,
        max_results: usize,
    ) -> Result<DetectionReport, Self::Error>;
}

/// Scale detector-resolution corners into display coordinates
pub fn scale_corners(corners: &[Point; 4], from: ImageSize, to: ImageSize) -> [Point; 4] {
    let sx = ratio(to.width, from.width);
    let sy = ratio(to.height, from.height);
    corners.map(|c| c.scaled(sx, sy))
}

fn ratio(to: u32, from: u32) -> f64 {
    if from == 0 {
        1.0
    } else {
        f64::from(to) / f64::from(from)
    }
}

/// Build a closed four-vertex polygon from a candidate, in display coordinates
pub fn seed_polygon(candidate: &QuadCandidate, detector_size: ImageSize, display: ImageSize) -> Measurement {
    let corners = scale_corners(&candidate.corners, detector_size, display);
    Measurement::from_shape(Shape::Polygon {
        vertices: corners.to_vec(),
        is_closed: true,
    })
}
