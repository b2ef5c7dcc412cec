//! Undo/redo engine
//!
//! Every user-visible mutation of a project is recorded as one
//! [`UndoableOperation`] after it has been applied. Image replacements keep
//! only the before/after file references; geometry edits keep full copies of
//! the measurement collection, which is small.

use crate::collection::MeasurementCollection;
use crate::project::{GridSize, ImageRef, ProjectState};
use std::collections::VecDeque;

/// Default number of operations kept on the undo stack
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// A recorded, reversible mutation
#[derive(Debug, Clone, PartialEq)]
pub enum UndoableOperation {
    /// The working image was replaced (transform, re-import)
    ImageReplace { before: ImageRef, after: ImageRef },
    /// Any change to the measurement collection, including calibration
    GeometryEdit {
        before: Box<MeasurementCollection>,
        after: Box<MeasurementCollection>,
    },
    /// The overlay grid spacing changed
    GridResize { before: GridSize, after: GridSize },
}

impl UndoableOperation {
    /// Record a geometry edit between two collection snapshots
    pub fn geometry_edit(before: MeasurementCollection, after: MeasurementCollection) -> Self {
        UndoableOperation::GeometryEdit {
            before: Box::new(before),
            after: Box::new(after),
        }
    }

    /// Short human-readable name, e.g. for an "Undo …" menu entry
    pub fn label(&self) -> &'static str {
        match self {
            UndoableOperation::ImageReplace { .. } => "image edit",
            UndoableOperation::GeometryEdit { .. } => "measurement edit",
            UndoableOperation::GridResize { .. } => "grid resize",
        }
    }

    /// Restore the state from before the operation
    pub fn undo(&self, state: &mut ProjectState) {
        match self {
            UndoableOperation::ImageReplace { before, .. } => state.image = before.clone(),
            UndoableOperation::GeometryEdit { before, .. } => {
                restore_keeping_selection(&mut state.measurements, before)
            }
            UndoableOperation::GridResize { before, .. } => state.grid = *before,
        }
    }

    /// Re-apply the operation
    pub fn redo(&self, state: &mut ProjectState) {
        match self {
            UndoableOperation::ImageReplace { after, .. } => state.image = after.clone(),
            UndoableOperation::GeometryEdit { after, .. } => {
                restore_keeping_selection(&mut state.measurements, after)
            }
            UndoableOperation::GridResize { after, .. } => state.grid = *after,
        }
    }
}

/// Replace `current` with `snapshot`, carrying over the live selection
///
/// Snapshots hold whatever was selected when they were taken; selection
/// is not history, so the current one wins if its measurement survives.
fn restore_keeping_selection(current: &mut MeasurementCollection, snapshot: &MeasurementCollection) {
    let selected = current.selected().map(|m| m.id());
    *current = snapshot.clone();
    current.clear_selection();
    if let Some(id) = selected.filter(|&id| current.contains(id)) {
        let _ = current.select(id);
    }
}

/// What an undo or redo call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStep {
    /// An operation of this kind was undone or redone
    Applied(&'static str),
    /// Nothing to undo or redo
    Empty,
}

/// Bounded undo and redo stacks
#[derive(Debug, Clone)]
pub struct UndoRedoStack {
    /// Oldest entry at the front
    undo: VecDeque<UndoableOperation>,
    redo: Vec<UndoableOperation>,
    depth: usize,
}

impl Default for UndoRedoStack {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl UndoRedoStack {
    /// Create a stack keeping at most `depth` undo entries (minimum 1)
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Record an operation that has already been applied
    ///
    /// Clears the redo stack and drops the oldest entry beyond the depth.
    pub fn push(&mut self, op: UndoableOperation) {
        tracing::debug!(op = op.label(), "history push");
        self.redo.clear();
        self.undo.push_back(op);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    /// Undo the most recent operation
    pub fn undo(&mut self, state: &mut ProjectState) -> HistoryStep {
        let Some(op) = self.undo.pop_back() else {
            return HistoryStep::Empty;
        };
        op.undo(state);
        let label = op.label();
        tracing::debug!(op = label, "undo");
        self.redo.push(op);
        HistoryStep::Applied(label)
    }

    /// Redo the most recently undone operation
    pub fn redo(&mut self, state: &mut ProjectState) -> HistoryStep {
        let Some(op) = self.redo.pop() else {
            return HistoryStep::Empty;
        };
        op.redo(state);
        let label = op.label();
        tracing::debug!(op = label, "redo");
        self.undo.push_back(op);
        HistoryStep::Applied(label)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Label of the operation the next undo would revert
    pub fn next_undo(&self) -> Option<&'static str> {
        self.undo.back().map(UndoableOperation::label)
    }
}

/// Collapses a multi-event gesture into a single geometry edit
///
/// Snapshot the collection when the gesture starts, mutate it freely while
/// the gesture runs, then call [`GestureRecorder::finish`] once.
#[derive(Debug, Clone)]
pub struct GestureRecorder {
    before: MeasurementCollection,
}

impl GestureRecorder {
    pub fn begin(collection: &MeasurementCollection) -> Self {
        Self {
            before: collection.clone(),
        }
    }

    /// Snapshot taken when the gesture started
    pub fn before(&self) -> &MeasurementCollection {
        &self.before
    }

    /// The edit covering the whole gesture, or `None` if nothing changed
    pub fn finish(self, collection: &MeasurementCollection) -> Option<UndoableOperation> {
        (self.before != *collection)
            .then(|| UndoableOperation::geometry_edit(self.before, collection.clone()))
    }
}
