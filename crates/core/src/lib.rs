//! mergewatch core library.
//!
//! Continuously determines whether merging the local branch with a remote
//! branch would produce file conflicts, without mutating the working tree,
//! index, or any ref. Provides the git CLI client and invocation
//! abstraction, the dual-format merge-tree parser, the conflict state
//! differ, and the detection orchestrator.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod models;

// Re-exports for convenience.
pub use config::WatchConfig;
pub use conflict::{ConflictDetector, ConflictStateDiffer};
pub use git::{GitClient, GitRunner, MergeTreeProtocol, ProcessRunner};
pub use models::{ConflictSnapshot, DetectionStatus, DetectorEvent, ErrorKind, StateChange};
