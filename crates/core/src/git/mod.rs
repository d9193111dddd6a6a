//! Git tooling: invocation abstraction, typed CLI client, and the
//! merge-tree output parsers.

pub mod client;
pub mod merge_tree;
pub mod runner;

pub use client::{parse_git_version, GitClient, MergeTreeProtocol};
pub use runner::{CommandOutput, GitRunner, ProcessRunner};
