//! Error types for the mergewatch core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. Cycle-level
//! failure classification (fetch-failed, no-head, ...) lives in
//! [`crate::models::ErrorKind`]; the types here describe *why* an individual
//! operation failed.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from git CLI operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with a status outside its expected set.
    #[error("git command failed (exit {exit_code}): {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// A `git` command exceeded the wall-clock bound.
    #[error("git command timed out after {0}s")]
    Timeout(u64),

    /// Captured output exceeded the size bound.
    #[error("git output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    /// Output that should have had a fixed shape could not be parsed.
    #[error("failed to parse git output: {0}")]
    ParseError(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
