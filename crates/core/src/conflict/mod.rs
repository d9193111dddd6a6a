//! Conflict detection: the state differ and the cycle orchestrator.

pub mod detector;
pub mod differ;

pub use detector::ConflictDetector;
pub use differ::ConflictStateDiffer;
