//! Conflict state differ.
//!
//! Compares each newly produced snapshot against the previously retained one
//! so listeners are only re-alerted when something meaningful changed: a
//! status transition into conflicts, or a grown/shifted conflicting file set
//! while the coarse status stayed `conflicts`.

use std::collections::HashSet;

use crate::models::{ConflictSnapshot, DetectionStatus, StateChange};

/// Holds the single retained snapshot and classifies transitions.
///
/// Pure apart from that one slot, which is mutated only through
/// [`update`](Self::update) and [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct ConflictStateDiffer {
    previous: Option<ConflictSnapshot>,
}

impl ConflictStateDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `snapshot` against the retained one, then retain `snapshot`
    /// unconditionally (even when nothing changed).
    pub fn update(&mut self, snapshot: ConflictSnapshot) -> StateChange {
        let change = match &self.previous {
            None => StateChange {
                changed: true,
                is_new_conflict: snapshot.status == DetectionStatus::Conflicts,
            },
            Some(prev) => {
                let status_changed = prev.status != snapshot.status;
                let file_set_changed = file_set(prev) != file_set(&snapshot);
                let is_new_conflict = snapshot.status == DetectionStatus::Conflicts
                    && match prev.status {
                        DetectionStatus::Clean
                        | DetectionStatus::Error
                        | DetectionStatus::Paused => true,
                        DetectionStatus::Conflicts => file_set_changed,
                        // Transient phase, not a comparison baseline.
                        DetectionStatus::Checking => false,
                    };
                StateChange {
                    changed: status_changed || file_set_changed,
                    is_new_conflict,
                }
            }
        };
        self.previous = Some(snapshot);
        change
    }

    /// Forget the retained snapshot; the next update behaves like the first.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// The most recently retained snapshot, if any.
    pub fn current(&self) -> Option<&ConflictSnapshot> {
        self.previous.as_ref()
    }
}

/// Conflicting filepaths compared order-independently by value.
fn file_set(snapshot: &ConflictSnapshot) -> HashSet<&str> {
    snapshot
        .conflict_files
        .iter()
        .map(|f| f.filepath.as_str())
        .collect()
}
