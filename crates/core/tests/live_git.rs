//! End-to-end tests against a real git installation.
//!
//! These build throwaway repositories under a tempdir (a local "remote" plus
//! a clone watching it) and drive full detection cycles through
//! [`ProcessRunner`]. No network I/O: the remote is a plain directory clone.
//!
//! If `git` is not installed, tests skip gracefully.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use mergewatch_core::config::WatchConfig;
use mergewatch_core::models::DetectionStatus;
use mergewatch_core::{ConflictDetector, ProcessRunner};

// ===========================================================================
// Helper functions
// ===========================================================================

/// Returns `true` if `git` is available on `$PATH`.
fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run a git command in `dir`, panicking on failure.
fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Initialize a repository with identity configured and a `main` branch.
fn init_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]);
    git(dir, &["config", "user.name", "Test"]);
    git(dir, &["config", "user.email", "test@example.com"]);
}

fn commit_file(dir: &Path, filename: &str, content: &str, message: &str) {
    std::fs::write(dir.join(filename), content).unwrap();
    git(dir, &["add", filename]);
    git(dir, &["commit", "-m", message]);
}

/// Build an upstream repo with one seed commit plus a clone watching it.
/// Returns (tempdir, upstream path, clone path).
fn seeded_pair() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    let upstream = tmp.path().join("upstream");
    std::fs::create_dir(&upstream).unwrap();
    init_repo(&upstream);
    commit_file(&upstream, "file.txt", "base\n", "seed");

    let clone = tmp.path().join("clone");
    git(
        tmp.path(),
        &["clone", upstream.to_str().unwrap(), clone.to_str().unwrap()],
    );
    git(&clone, &["config", "user.name", "Test"]);
    git(&clone, &["config", "user.email", "test@example.com"]);

    (tmp, upstream, clone)
}

async fn detector_for(clone: &Path) -> ConflictDetector<ProcessRunner> {
    let config = WatchConfig {
        repo_path: clone.to_path_buf(),
        remote: "origin".into(),
        branch: "main".into(),
        ..WatchConfig::default()
    };
    ConflictDetector::new(config, ProcessRunner::new(clone)).await
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn detects_real_conflict_between_diverged_branches() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let (_tmp, upstream, clone) = seeded_pair();

    // Diverge: both sides rewrite the same line of the same file.
    commit_file(&upstream, "file.txt", "remote change\n", "remote edit");
    commit_file(&clone, "file.txt", "local change\n", "local edit");

    let detector = detector_for(&clone).await;
    detector.run_cycle().await;

    let snapshot = detector.current().expect("cycle retains a snapshot");
    assert_eq!(snapshot.status, DetectionStatus::Conflicts);
    assert_eq!(snapshot.file_paths(), vec!["file.txt"]);

    // Detection must not have touched the working tree.
    let content = std::fs::read_to_string(clone.join("file.txt")).unwrap();
    assert_eq!(content, "local change\n");
}

#[tokio::test]
async fn reports_clean_when_changes_do_not_overlap() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let (_tmp, upstream, clone) = seeded_pair();

    // Disjoint changes: a new file upstream, a different new file locally.
    commit_file(&upstream, "remote.txt", "remote\n", "remote addition");
    commit_file(&clone, "local.txt", "local\n", "local addition");

    let detector = detector_for(&clone).await;
    detector.run_cycle().await;

    let snapshot = detector.current().unwrap();
    assert_eq!(snapshot.status, DetectionStatus::Clean);
    assert!(snapshot.conflict_files.is_empty());
}

#[tokio::test]
async fn conflict_clears_after_remote_side_reverts() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let (_tmp, upstream, clone) = seeded_pair();

    commit_file(&upstream, "file.txt", "remote change\n", "remote edit");
    commit_file(&clone, "file.txt", "local change\n", "local edit");

    let detector = detector_for(&clone).await;
    detector.run_cycle().await;
    assert_eq!(
        detector.current().unwrap().status,
        DetectionStatus::Conflicts
    );

    // Upstream backs the conflicting edit out; the next cycle sees clean.
    commit_file(&upstream, "file.txt", "base\n", "revert remote edit");
    detector.run_cycle().await;
    assert_eq!(detector.current().unwrap().status, DetectionStatus::Clean);
}

#[tokio::test]
async fn dirty_tree_simulation_sees_uncommitted_conflict() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let (_tmp, upstream, clone) = seeded_pair();

    commit_file(&upstream, "file.txt", "remote change\n", "remote edit");
    // Local edit stays uncommitted.
    std::fs::write(clone.join("file.txt"), "uncommitted local change\n").unwrap();

    let config = WatchConfig {
        repo_path: clone.clone(),
        simulate_dirty_tree: true,
        ..WatchConfig::default()
    };
    let detector = ConflictDetector::new(config, ProcessRunner::new(&clone)).await;
    detector.run_cycle().await;

    let snapshot = detector.current().unwrap();
    assert_eq!(snapshot.status, DetectionStatus::Conflicts);
    assert!(snapshot.dirty_tree_used);
    assert_eq!(snapshot.file_paths(), vec!["file.txt"]);

    // The uncommitted edit is still there untouched.
    let content = std::fs::read_to_string(clone.join("file.txt")).unwrap();
    assert_eq!(content, "uncommitted local change\n");
}

#[tokio::test]
async fn missing_remote_branch_is_classified() {
    if !git_available() {
        eprintln!("skipping: git not available");
        return;
    }
    let (_tmp, _upstream, clone) = seeded_pair();

    let config = WatchConfig {
        repo_path: clone.clone(),
        branch: "does-not-exist".into(),
        ..WatchConfig::default()
    };
    let detector = ConflictDetector::new(config, ProcessRunner::new(&clone)).await;
    detector.run_cycle().await;

    let snapshot = detector.current().unwrap();
    assert_eq!(snapshot.status, DetectionStatus::Error);
    assert_eq!(
        snapshot.error_kind,
        Some(mergewatch_core::models::ErrorKind::BranchMissing)
    );
}
