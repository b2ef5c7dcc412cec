//! Calibration and its broadcast to measurements
//!
//! A project has exactly one [`Calibration`]: the number of real-world units
//! represented by one image pixel, plus the unit label. The collection owns
//! the canonical value; every measurement carries a copy that is refreshed
//! synchronously whenever the calibration changes, so nothing is ever
//! rendered with a stale scale.

use crate::error::{MeasurementError, MeasurementResult};
use crate::geometry::Point;
use crate::measurement::Measurement;

/// Unit label used when no calibration has been set
pub const PIXEL_UNITS: &str = "px";

/// Common real-world units offered when calibrating
pub const CALIBRATION_UNITS: [&str; 7] = ["mm", "cm", "m", "in", "ft", "yd", "px"];

/// Pixel-to-real-world scale shared by all measurements of a project
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawCalibration")]
pub struct Calibration {
    /// Real-world units per pixel (always > 0 and finite)
    scale_factor: f64,
    /// Unit label (e.g. "cm", "in")
    units: String,
}

/// Unvalidated calibration as read from a project file
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCalibration {
    scale_factor: f64,
    units: String,
}

impl TryFrom<RawCalibration> for Calibration {
    type Error = MeasurementError;

    fn try_from(raw: RawCalibration) -> Result<Self, Self::Error> {
        Calibration::new(raw.scale_factor, raw.units)
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            units: PIXEL_UNITS.to_string(),
        }
    }
}

impl Calibration {
    /// Create a calibration, rejecting non-positive or non-finite scales
    pub fn new(scale_factor: f64, units: impl Into<String>) -> MeasurementResult<Self> {
        if !scale_factor.is_finite() || scale_factor <= 0.0 {
            return Err(MeasurementError::InvalidCalibration(
                "scale factor must be positive and finite",
            ));
        }
        Ok(Self {
            scale_factor,
            units: units.into(),
        })
    }

    /// Two-point calibration: the segment `p0`-`p1` is `known_length` units long
    pub fn from_reference(
        p0: Point,
        p1: Point,
        known_length: f64,
        units: impl Into<String>,
    ) -> MeasurementResult<Self> {
        let pixels = p0.distance_to(&p1);
        if pixels == 0.0 {
            return Err(MeasurementError::InvalidCalibration(
                "reference segment has zero length",
            ));
        }
        if !known_length.is_finite() || known_length <= 0.0 {
            return Err(MeasurementError::InvalidCalibration(
                "reference length must be positive and finite",
            ));
        }
        Self::new(known_length / pixels, units)
    }

    /// Real-world units per pixel
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Unit label
    pub fn units(&self) -> &str {
        &self.units
    }

    /// Whether this is the identity pixel calibration
    pub fn is_uncalibrated(&self) -> bool {
        self.scale_factor == 1.0 && self.units == PIXEL_UNITS
    }

    /// Convert a pixel length to real-world units
    pub fn to_real_length(&self, pixels: f64) -> f64 {
        pixels * self.scale_factor
    }

    /// Convert a pixel area to real-world square units
    pub fn to_real_area(&self, square_pixels: f64) -> f64 {
        square_pixels * self.scale_factor * self.scale_factor
    }

    /// Convert a real-world length back to pixels
    pub fn to_pixels(&self, real_length: f64) -> f64 {
        real_length / self.scale_factor
    }
}

/// Push `calibration` to every measurement in `targets`
///
/// Runs synchronously; when it returns, every target's display text reflects
/// the new scale and units. Returns the number of measurements notified.
pub fn broadcast<'a, I>(calibration: &Calibration, targets: I) -> usize
where
    I: IntoIterator<Item = &'a mut Measurement>,
{
    let mut notified = 0;
    for measurement in targets {
        measurement.set_calibration(calibration.clone());
        notified += 1;
    }
    tracing::debug!(
        scale_factor = calibration.scale_factor(),
        units = calibration.units(),
        notified,
        "calibration broadcast"
    );
    notified
}
