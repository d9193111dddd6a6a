//! Asynchronous git CLI client.
//!
//! A thin typed layer over [`GitRunner`]: one method per tool operation,
//! each declaring which exit codes are expected. Any other exit code
//! surfaces as [`GitError::CommandFailed`].

use tracing::{debug, instrument, warn};

use super::runner::{CommandOutput, GitRunner};
use crate::errors::GitError;

// ---------------------------------------------------------------------------
// Protocol selection
// ---------------------------------------------------------------------------

/// Which merge-simulation command shape the installed git supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeTreeProtocol {
    /// `merge-tree --write-tree` (git >= 2.38).
    Modern,
    /// Three-argument `merge-tree <base> <ours> <theirs>`.
    Legacy,
}

impl MergeTreeProtocol {
    /// Pick the protocol from `git version` output. Anything unparseable
    /// falls back to legacy, which every supported git understands.
    pub fn from_version(text: &str) -> Self {
        match parse_git_version(text) {
            Some((major, minor)) if major > 2 || (major == 2 && minor >= 38) => Self::Modern,
            _ => Self::Legacy,
        }
    }
}

impl std::fmt::Display for MergeTreeProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Modern => write!(f, "modern"),
            Self::Legacy => write!(f, "legacy"),
        }
    }
}

/// Extract the first two dot-separated integer components from free-form
/// version text, ignoring any suffix (`"git version 2.39.2.windows.1"`).
pub fn parse_git_version(text: &str) -> Option<(u32, u32)> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let mut parts = text[start..].split('.');
    let major = leading_digits(parts.next()?)?;
    let minor = leading_digits(parts.next()?)?;
    Some((major, minor))
}

fn leading_digits(s: &str) -> Option<u32> {
    let digits: &str = &s[..s.bytes().take_while(|b| b.is_ascii_digit()).count()];
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Typed git operations over an injected [`GitRunner`].
#[derive(Debug, Clone)]
pub struct GitClient<R: GitRunner> {
    runner: R,
}

impl<R: GitRunner> GitClient<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Run `args`, treating any exit code outside `expected` as a failure.
    async fn run_expecting(
        &self,
        args: &[&str],
        expected: &[i32],
    ) -> Result<CommandOutput, GitError> {
        let output = self.runner.run(args).await?;
        if !expected.contains(&output.exit_code) {
            warn!(
                cmd = %format!("git {}", args.join(" ")),
                exit_code = output.exit_code,
                stderr = %output.stderr,
                "git command failed"
            );
            return Err(GitError::CommandFailed {
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// The `git version` banner, trimmed.
    pub async fn version(&self) -> Result<String, GitError> {
        let output = self.run_expecting(&["version"], &[0]).await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Fetch refs from `remote`.
    #[instrument(skip(self))]
    pub async fn fetch(&self, remote: &str) -> Result<(), GitError> {
        self.run_expecting(&["fetch", remote], &[0]).await?;
        debug!(remote, "fetch completed");
        Ok(())
    }

    /// Resolve a ref to its object identifier. Non-zero exit means the ref
    /// is missing.
    pub async fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        let output = self
            .run_expecting(&["rev-parse", "--verify", rev], &[0])
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    /// The merge base of two refs.
    pub async fn merge_base(&self, a: &str, b: &str) -> Result<String, GitError> {
        let output = self.run_expecting(&["merge-base", a, b], &[0]).await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Modern merge simulation. Exit 0 means clean, exit 1 means conflicts;
    /// the raw output and exit code are returned for the parser.
    #[instrument(skip(self))]
    pub async fn merge_tree_modern(
        &self,
        ours: &str,
        theirs: &str,
    ) -> Result<CommandOutput, GitError> {
        self.run_expecting(&["merge-tree", "--write-tree", ours, theirs], &[0, 1])
            .await
    }

    /// Legacy merge simulation; always exits 0, conflict info is in the body.
    #[instrument(skip(self))]
    pub async fn merge_tree_legacy(
        &self,
        base: &str,
        ours: &str,
        theirs: &str,
    ) -> Result<String, GitError> {
        let output = self
            .run_expecting(&["merge-tree", base, ours, theirs], &[0])
            .await?;
        Ok(output.stdout)
    }

    /// Raw content of an object.
    pub async fn show_object(&self, oid: &str) -> Result<String, GitError> {
        let output = self.run_expecting(&["cat-file", "-p", oid], &[0]).await?;
        Ok(output.stdout)
    }

    /// Content of a file as it exists at `rev`.
    pub async fn show_file_at(&self, rev: &str, path: &str) -> Result<String, GitError> {
        let spec = format!("{rev}:{path}");
        let output = self.run_expecting(&["show", &spec], &[0]).await?;
        Ok(output.stdout)
    }

    /// Porcelain status. Empty output means clean.
    pub async fn status_porcelain(&self, tracked_only: bool) -> Result<String, GitError> {
        let args: &[&str] = if tracked_only {
            &["status", "--porcelain", "--untracked-files=no"]
        } else {
            &["status", "--porcelain"]
        };
        let output = self.run_expecting(args, &[0]).await?;
        Ok(output.stdout)
    }

    /// Whether tracked files have uncommitted modifications.
    pub async fn is_dirty(&self) -> Result<bool, GitError> {
        let status = self.status_porcelain(true).await?;
        Ok(!status.trim().is_empty())
    }

    /// The current branch's upstream ref (e.g. `origin/main`), or `None`
    /// when no upstream is configured (exit 128).
    pub async fn upstream_ref(&self) -> Result<Option<String>, GitError> {
        let output = self
            .run_expecting(&["rev-parse", "--abbrev-ref", "@{upstream}"], &[0, 128])
            .await?;
        if output.exit_code == 128 {
            return Ok(None);
        }
        Ok(Some(output.stdout.trim().to_string()))
    }

    /// Fast-forward the current branch to `target`. Returns whether the
    /// branch advanced; non-zero exit means it could not.
    #[instrument(skip(self))]
    pub async fn merge_ff_only(&self, target: &str) -> Result<bool, GitError> {
        let output = self
            .run_expecting(&["merge", "--ff-only", target], &[0, 1, 128])
            .await?;
        Ok(output.exit_code == 0)
    }

    /// Rebase the current branch onto `target`, stashing and restoring any
    /// local modifications around the rebase. Returns whether it advanced.
    #[instrument(skip(self))]
    pub async fn rebase_autostash(&self, target: &str) -> Result<bool, GitError> {
        let output = self
            .run_expecting(&["rebase", "--autostash", target], &[0, 1, 128])
            .await?;
        Ok(output.exit_code == 0)
    }

    /// Oneline log of commits in `from..to` touching `path`.
    pub async fn log_oneline_for_path(
        &self,
        from: &str,
        to: &str,
        path: &str,
    ) -> Result<Vec<String>, GitError> {
        let range = format!("{from}..{to}");
        let output = self
            .run_expecting(&["log", "--oneline", &range, "--", path], &[0])
            .await?;
        Ok(output
            .stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Create a throwaway snapshot commit of the working tree without
    /// touching the index, working tree, or stash list. Returns `None` when
    /// there is nothing to snapshot.
    pub async fn stash_create(&self) -> Result<Option<String>, GitError> {
        let output = self.run_expecting(&["stash", "create"], &[0]).await?;
        let oid = output.stdout.trim();
        if oid.is_empty() {
            Ok(None)
        } else {
            Ok(Some(oid.to_string()))
        }
    }

    /// Number of commits in `from..to`.
    pub async fn count_commits(&self, from: &str, to: &str) -> Result<u64, GitError> {
        let range = format!("{from}..{to}");
        let output = self
            .run_expecting(&["rev-list", "--count", &range], &[0])
            .await?;
        output
            .stdout
            .trim()
            .parse()
            .map_err(|_| GitError::ParseError(format!("bad rev-list count: {:?}", output.stdout)))
    }
}
