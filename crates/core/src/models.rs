//! Domain model types shared by the detector, differ, and daemon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::git::merge_tree::ConflictFileEntry;

// ---------------------------------------------------------------------------
// Detection status
// ---------------------------------------------------------------------------

/// Outcome classification of a detection cycle.
///
/// `Checking` is transient: it is published at the start of every cycle and
/// every cycle concludes in exactly one of the other four states. `Paused`
/// is entered only via the explicit pause toggle, never by a cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Clean,
    Conflicts,
    Error,
    Paused,
    Checking,
}

impl std::fmt::Display for DetectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Conflicts => write!(f, "conflicts"),
            Self::Error => write!(f, "error"),
            Self::Paused => write!(f, "paused"),
            Self::Checking => write!(f, "checking"),
        }
    }
}

/// Which cycle step failed when `status == Error`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    FetchFailed,
    NoHead,
    BranchMissing,
    MergeTreeFailed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetchFailed => write!(f, "fetch-failed"),
            Self::NoHead => write!(f, "no-head"),
            Self::BranchMissing => write!(f, "branch-missing"),
            Self::MergeTreeFailed => write!(f, "merge-tree-failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The externally visible result of one completed detection cycle (or of a
/// pause/resolution toggle).
///
/// A snapshot is immutable once published and is superseded, never mutated,
/// by the next one. `conflict_files` is the effective list after
/// resolved-file filtering; `status == Conflicts` iff it is non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSnapshot {
    pub timestamp: DateTime<Utc>,
    pub status: DetectionStatus,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub conflict_files: Vec<ConflictFileEntry>,
    pub toplevel_tree_oid: String,
    /// True when the simulated merge used uncommitted local state rather
    /// than the committed HEAD.
    pub dirty_tree_used: bool,
}

impl ConflictSnapshot {
    fn base(status: DetectionStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            error_kind: None,
            error_message: None,
            conflict_files: Vec::new(),
            toplevel_tree_oid: String::new(),
            dirty_tree_used: false,
        }
    }

    /// Transient snapshot published at the start of a cycle.
    pub fn checking() -> Self {
        Self::base(DetectionStatus::Checking)
    }

    /// A cycle that found no conflicts after filtering.
    pub fn clean(toplevel_tree_oid: String, dirty_tree_used: bool) -> Self {
        Self {
            toplevel_tree_oid,
            dirty_tree_used,
            ..Self::base(DetectionStatus::Clean)
        }
    }

    /// A cycle that found conflicts. `conflict_files` must be non-empty;
    /// callers with an empty filtered list build [`ConflictSnapshot::clean`]
    /// instead.
    pub fn conflicts(
        conflict_files: Vec<ConflictFileEntry>,
        toplevel_tree_oid: String,
        dirty_tree_used: bool,
    ) -> Self {
        debug_assert!(!conflict_files.is_empty());
        Self {
            conflict_files,
            toplevel_tree_oid,
            dirty_tree_used,
            ..Self::base(DetectionStatus::Conflicts)
        }
    }

    /// A cycle that failed at a classified step.
    pub fn error(kind: ErrorKind, message: String) -> Self {
        Self {
            error_kind: Some(kind),
            error_message: Some(message),
            ..Self::base(DetectionStatus::Error)
        }
    }

    /// Published when detection is explicitly paused.
    pub fn paused() -> Self {
        Self::base(DetectionStatus::Paused)
    }

    /// Filepaths of the effective conflicting files.
    pub fn file_paths(&self) -> Vec<&str> {
        self.conflict_files
            .iter()
            .map(|f| f.filepath.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// State change
// ---------------------------------------------------------------------------

/// What the differ concluded about a newly observed snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateChange {
    /// Status or conflicting-file set differs from the retained snapshot.
    pub changed: bool,
    /// The change warrants a fresh conflict alert.
    pub is_new_conflict: bool,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Event published by the detector to external listeners.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectorEvent {
    /// A snapshot was produced, together with the differ's verdict.
    SnapshotUpdated {
        snapshot: ConflictSnapshot,
        change: StateChange,
    },
    /// The auto-update step advanced the local branch. Only emitted when
    /// `commit_count > 0`.
    AutoUpdate { commit_count: u64, new_head: String },
}

// ---------------------------------------------------------------------------
// Auto-update strategy
// ---------------------------------------------------------------------------

/// How the optional auto-update step advances the local branch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// Fast-forward only; skipped entirely when the working tree is dirty.
    #[default]
    FfOnly,
    /// Rebase with autostash; proceeds even when the working tree is dirty.
    Rebase,
}

impl std::fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FfOnly => write!(f, "ff_only"),
            Self::Rebase => write!(f, "rebase"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_constructors_uphold_status_invariant() {
        let clean = ConflictSnapshot::clean("abc".into(), false);
        assert_eq!(clean.status, DetectionStatus::Clean);
        assert!(clean.conflict_files.is_empty());

        let err = ConflictSnapshot::error(ErrorKind::FetchFailed, "boom".into());
        assert_eq!(err.status, DetectionStatus::Error);
        assert_eq!(err.error_kind, Some(ErrorKind::FetchFailed));
        assert!(err.conflict_files.is_empty());

        let paused = ConflictSnapshot::paused();
        assert_eq!(paused.status, DetectionStatus::Paused);
        assert!(paused.error_kind.is_none());
    }

    #[test]
    fn test_event_json_carries_type_tag_and_wire_names() {
        let event = DetectorEvent::AutoUpdate {
            commit_count: 2,
            new_head: "abc".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "auto_update");
        assert_eq!(json["commit_count"], 2);

        let snapshot = ConflictSnapshot::error(ErrorKind::NoHead, "gone".into());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_kind"], "no-head");
        assert_eq!(json["dirty_tree_used"], false);
    }

    #[test]
    fn test_error_kind_display_matches_wire_form() {
        assert_eq!(ErrorKind::FetchFailed.to_string(), "fetch-failed");
        assert_eq!(ErrorKind::NoHead.to_string(), "no-head");
        assert_eq!(ErrorKind::BranchMissing.to_string(), "branch-missing");
        assert_eq!(ErrorKind::MergeTreeFailed.to_string(), "merge-tree-failed");
    }
}
