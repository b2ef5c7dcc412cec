//! Measurement collection
//!
//! Holds every measurement of one project, grouped per kind in insertion
//! order, together with the project's single [`Calibration`].
//!
//! Invariants:
//! - every contained measurement carries the collection's calibration
//! - no two measurements share an id

use crate::calibration::{self, Calibration};
use crate::error::{MeasurementError, MeasurementResult};
use crate::geometry::Point;
use crate::measurement::{Measurement, MeasurementId, MeasurementKind, MeasurementStyle};

/// All measurements of a project plus the shared calibration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementCollection {
    /// One ordered list per kind, indexed by [`MeasurementKind::index`]
    lists: [Vec<Measurement>; 6],
    /// Shared calibration
    calibration: Calibration,
}

impl MeasurementCollection {
    /// Create an empty, uncalibrated collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection with a calibration
    pub fn with_calibration(calibration: Calibration) -> Self {
        Self {
            calibration,
            ..Self::default()
        }
    }

    /// Current calibration
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Replace the calibration and push it to every measurement
    ///
    /// Returns the number of measurements notified.
    pub fn set_calibration(&mut self, calibration: Calibration) -> usize {
        self.calibration = calibration;
        calibration::broadcast(&self.calibration, self.lists.iter_mut().flatten())
    }

    /// Register a measurement, applying the collection's calibration first
    pub fn insert(&mut self, mut measurement: Measurement) -> MeasurementResult<MeasurementId> {
        let id = measurement.id();
        if self.contains(id) {
            return Err(MeasurementError::DuplicateId(id));
        }
        measurement.set_calibration(self.calibration.clone());
        self.lists[measurement.kind().index()].push(measurement);
        Ok(id)
    }

    /// Unregister a measurement; its id becomes invalid
    pub fn remove(&mut self, id: MeasurementId) -> MeasurementResult<Measurement> {
        let (list, index) = self
            .locate(id)
            .ok_or(MeasurementError::UnknownMeasurement(id))?;
        Ok(self.lists[list].remove(index))
    }

    /// Get a measurement by id
    pub fn get(&self, id: MeasurementId) -> Option<&Measurement> {
        self.locate(id).map(|(list, index)| &self.lists[list][index])
    }

    /// Whether a measurement with this id is registered
    pub fn contains(&self, id: MeasurementId) -> bool {
        self.locate(id).is_some()
    }

    /// Move one defining point of a measurement
    pub fn move_point(
        &mut self,
        id: MeasurementId,
        index: usize,
        point: Point,
    ) -> MeasurementResult<()> {
        self.get_mut(id)?.move_point(index, point)
    }

    /// Move a whole measurement
    pub fn translate(&mut self, id: MeasurementId, dx: f64, dy: f64) -> MeasurementResult<()> {
        self.get_mut(id)?.translate(dx, dy);
        Ok(())
    }

    /// Change color and thickness of a measurement
    pub fn set_style(&mut self, id: MeasurementId, style: MeasurementStyle) -> MeasurementResult<()> {
        self.get_mut(id)?.set_style(style);
        Ok(())
    }

    /// Flag a measurement as being edited (handle drag in progress)
    pub fn set_editing(&mut self, id: MeasurementId, editing: bool) -> MeasurementResult<()> {
        self.get_mut(id)?.set_editing(editing);
        Ok(())
    }

    /// Select exactly one measurement
    pub fn select(&mut self, id: MeasurementId) -> MeasurementResult<()> {
        if !self.contains(id) {
            return Err(MeasurementError::UnknownMeasurement(id));
        }
        for m in self.lists.iter_mut().flatten() {
            m.set_selected(m.id() == id);
        }
        Ok(())
    }

    /// Deselect everything
    pub fn clear_selection(&mut self) {
        for m in self.lists.iter_mut().flatten() {
            m.set_selected(false);
        }
    }

    /// Currently selected measurement, if any
    pub fn selected(&self) -> Option<&Measurement> {
        self.iter().find(|m| m.is_selected())
    }

    /// All measurements, kind by kind, each kind in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.lists.iter().flatten()
    }

    /// Measurements of one kind in insertion order
    pub fn of_kind(&self, kind: MeasurementKind) -> &[Measurement] {
        &self.lists[kind.index()]
    }

    /// Total number of measurements
    pub fn len(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }

    /// Remove every measurement, keeping the calibration
    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }

    /// Find the topmost measurement handle under `point`
    ///
    /// Later measurements are drawn on top, so they are tested first.
    pub fn hit_test(&self, point: &Point, tolerance: f64) -> Option<(MeasurementId, usize)> {
        self.lists
            .iter()
            .rev()
            .flat_map(|list| list.iter().rev())
            .find_map(|m| m.hit_handle(point, tolerance).map(|handle| (m.id(), handle)))
    }

    /// Check the collection invariants
    pub fn is_consistent(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.lists.iter().enumerate().all(|(index, list)| {
            list.iter().all(|m| {
                m.kind().index() == index
                    && m.calibration() == &self.calibration
                    && seen.insert(m.id())
            })
        })
    }

    fn get_mut(&mut self, id: MeasurementId) -> MeasurementResult<&mut Measurement> {
        let (list, index) = self
            .locate(id)
            .ok_or(MeasurementError::UnknownMeasurement(id))?;
        Ok(&mut self.lists[list][index])
    }

    fn locate(&self, id: MeasurementId) -> Option<(usize, usize)> {
        self.lists.iter().enumerate().find_map(|(list, items)| {
            items
                .iter()
                .position(|m| m.id() == id)
                .map(|index| (list, index))
        })
    }
}
