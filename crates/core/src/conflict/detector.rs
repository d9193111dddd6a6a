//! Detection orchestrator.
//!
//! Drives the full detection cycle: fetch, ref resolution, optional
//! auto-update, merge simulation, resolved-file filtering, state diffing,
//! and event publication. Detection never mutates the working tree, index,
//! or any ref; the only write the cycle may perform is the opt-in
//! auto-update of the local branch.
//!
//! One detector instance is constructed per watched repository and owns all
//! retained state (previous snapshot, resolved-files set, raw path set,
//! merge-input tree identity). Cycles never overlap: a trigger while a cycle
//! is in flight is a silent no-op.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::errors::GitError;
use crate::git::merge_tree::{
    parse_merge_tree_legacy, parse_merge_tree_modern, ConflictFileEntry, MergeTreeResult,
};
use crate::git::{GitClient, GitRunner, MergeTreeProtocol};
use crate::models::{
    ConflictSnapshot, DetectionStatus, DetectorEvent, ErrorKind, StateChange, UpdateStrategy,
};

use super::differ::ConflictStateDiffer;

const EVENT_CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Retained state
// ---------------------------------------------------------------------------

/// State shared between cycles and the resolution side-channel. All of it is
/// mutated from the single logical thread of control driving cycles; the
/// mutex only guards against the side-channel racing a publish.
#[derive(Debug, Default)]
struct DetectorState {
    differ: ConflictStateDiffer,
    /// Paths the user marked resolved; cleared in full when merge inputs
    /// change.
    resolved_files: HashSet<String>,
    /// Raw (unfiltered) conflicting path set from the last successful cycle.
    raw_paths: BTreeSet<String>,
    /// Tree identity of the merge source used in the last successful cycle.
    merge_tree_identity: Option<String>,
    /// Unfiltered parser result from the last successful cycle, kept so the
    /// resolution side-channel can synthesize filtered snapshots.
    last_result: Option<MergeTreeResult>,
    last_dirty_tree_used: bool,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// The conflict detection engine for one repository.
pub struct ConflictDetector<R: GitRunner> {
    config: RwLock<WatchConfig>,
    git: GitClient<R>,
    protocol: MergeTreeProtocol,
    running: AtomicBool,
    paused: AtomicBool,
    state: Mutex<DetectorState>,
    events: broadcast::Sender<DetectorEvent>,
}

impl<R: GitRunner> ConflictDetector<R> {
    /// Build a detector, probing the installed git once to select the
    /// merge-tree protocol. Any failure to obtain or parse the version
    /// falls back to the legacy protocol.
    pub async fn new(config: WatchConfig, runner: R) -> Self {
        let git = GitClient::new(runner);
        let protocol = match git.version().await {
            Ok(version) => {
                let protocol = MergeTreeProtocol::from_version(&version);
                info!(%version, %protocol, "detected git merge-tree protocol");
                protocol
            }
            Err(e) => {
                warn!(error = %e, "could not query git version, using legacy merge-tree");
                MergeTreeProtocol::Legacy
            }
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config: RwLock::new(config),
            git,
            protocol,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            state: Mutex::new(DetectorState::default()),
            events,
        }
    }

    /// Subscribe to published detector events.
    pub fn subscribe(&self) -> broadcast::Receiver<DetectorEvent> {
        self.events.subscribe()
    }

    /// The protocol selected at startup.
    pub fn protocol(&self) -> MergeTreeProtocol {
        self.protocol
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> WatchConfig {
        self.lock_config().clone()
    }

    /// Replace the configuration; takes effect from the next cycle. The
    /// poll timer restart is the caller's concern.
    pub fn update_config(&self, config: WatchConfig) {
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// The most recently retained snapshot, if any.
    pub fn current(&self) -> Option<ConflictSnapshot> {
        self.lock_state().differ.current().cloned()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    // -- cycle --------------------------------------------------------------

    /// Run one detection cycle. A no-op while paused or while another cycle
    /// is in flight.
    pub async fn run_cycle(&self) {
        if self.paused.load(Ordering::SeqCst) {
            debug!("detection paused, skipping cycle");
            return;
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("detection cycle already in flight, skipping");
            return;
        }
        let _guard = RunningGuard {
            flag: &self.running,
        };

        // Synchronous signal that work has started; not routed through the
        // differ, so the end-of-cycle comparison baseline stays the previous
        // terminal status.
        self.publish(ConflictSnapshot::checking(), StateChange::default());

        let snapshot = match self.detect_once().await {
            Ok(snapshot) => snapshot,
            Err((kind, message)) => {
                error!(kind = %kind, %message, "detection cycle failed");
                ConflictSnapshot::error(kind, message)
            }
        };

        let change = self.lock_state().differ.update(snapshot.clone());
        info!(
            status = %snapshot.status,
            files = snapshot.conflict_files.len(),
            changed = change.changed,
            new_conflict = change.is_new_conflict,
            "detection cycle completed"
        );
        self.publish(snapshot, change);
    }

    /// The fallible portion of a cycle, classified per failing step.
    async fn detect_once(&self) -> Result<ConflictSnapshot, (ErrorKind, String)> {
        let config = self.config();

        self.git.fetch(&config.remote).await.map_err(|e| {
            (
                ErrorKind::FetchFailed,
                format!("fetch from '{}' failed: {e}", config.remote),
            )
        })?;

        let mut head = self
            .git
            .rev_parse("HEAD")
            .await
            .map_err(|e| (ErrorKind::NoHead, format!("could not resolve HEAD: {e}")))?;

        let remote_ref = config.remote_ref();
        let branch_oid = self.git.rev_parse(&remote_ref).await.map_err(|e| {
            (
                ErrorKind::BranchMissing,
                format!("could not resolve '{remote_ref}': {e}"),
            )
        })?;

        // Optional auto-update; failures are logged and swallowed, never
        // promoted to cycle-level errors.
        if config.auto_update {
            match self.auto_update(&head, config.update_strategy).await {
                Ok(Some(new_head)) => head = new_head,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "auto-update failed, continuing with current HEAD"),
            }
        }

        // Optionally merge from uncommitted local state instead of HEAD.
        let mut merge_source = head.clone();
        let mut dirty_tree_used = false;
        if config.simulate_dirty_tree {
            match self.snapshot_dirty_tree().await {
                Ok(Some(snapshot_oid)) => {
                    debug!(oid = %snapshot_oid, "simulating merge from dirty working tree");
                    merge_source = snapshot_oid;
                    dirty_tree_used = true;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "dirty-tree snapshot failed, using HEAD"),
            }
        }

        // Stable content identity of the merge source, for resolved-file
        // tracking. Falls back to the commit identifier.
        let tree_spec = format!("{merge_source}^{{tree}}");
        let tree_identity = match self.git.rev_parse(&tree_spec).await {
            Ok(tree) => tree,
            Err(e) => {
                debug!(error = %e, "tree resolution failed, using commit id");
                merge_source.clone()
            }
        };

        let result = self
            .simulate_merge(&merge_source, &branch_oid)
            .await
            .map_err(|e| {
                (
                    ErrorKind::MergeTreeFailed,
                    format!("merge simulation failed: {e}"),
                )
            })?;

        Ok(self.filter_and_retain(result, tree_identity, dirty_tree_used))
    }

    /// Run the protocol-appropriate merge simulation and parse its output.
    async fn simulate_merge(
        &self,
        ours: &str,
        theirs: &str,
    ) -> Result<MergeTreeResult, GitError> {
        match self.protocol {
            MergeTreeProtocol::Modern => {
                let output = self.git.merge_tree_modern(ours, theirs).await?;
                Ok(parse_merge_tree_modern(&output.stdout, output.exit_code))
            }
            MergeTreeProtocol::Legacy => {
                let base = self.git.merge_base(ours, theirs).await?;
                let stdout = self.git.merge_tree_legacy(&base, ours, theirs).await?;
                Ok(parse_merge_tree_legacy(&stdout))
            }
        }
    }

    /// Advance the local branch toward its upstream. Returns the new HEAD
    /// when it moved.
    async fn auto_update(
        &self,
        head: &str,
        strategy: UpdateStrategy,
    ) -> Result<Option<String>, GitError> {
        let upstream = match self.git.upstream_ref().await? {
            Some(upstream) => upstream,
            None => {
                debug!("no upstream configured, skipping auto-update");
                return Ok(None);
            }
        };
        let upstream_oid = self.git.rev_parse(&upstream).await?;
        if upstream_oid == head {
            return Ok(None);
        }

        let dirty = self.git.is_dirty().await?;
        let advanced = match strategy {
            UpdateStrategy::FfOnly => {
                if dirty {
                    debug!("working tree dirty, skipping fast-forward update");
                    return Ok(None);
                }
                self.git.merge_ff_only(&upstream).await?
            }
            UpdateStrategy::Rebase => self.git.rebase_autostash(&upstream).await?,
        };
        if !advanced {
            debug!(%upstream, "local branch could not be advanced");
            return Ok(None);
        }

        let new_head = self.git.rev_parse("HEAD").await?;
        let commit_count = self.git.count_commits(head, &new_head).await?;
        if commit_count > 0 {
            info!(commits = commit_count, new_head = %new_head, "auto-updated local branch");
            let _ = self.events.send(DetectorEvent::AutoUpdate {
                commit_count,
                new_head: new_head.clone(),
            });
        }
        Ok(Some(new_head))
    }

    /// Materialize a throwaway snapshot of the dirty working tree, or `None`
    /// when tracked files are clean. `git stash create` writes the snapshot
    /// commit without touching the index, working tree, or stash list.
    async fn snapshot_dirty_tree(&self) -> Result<Option<String>, GitError> {
        if !self.git.is_dirty().await? {
            return Ok(None);
        }
        self.git.stash_create().await
    }

    /// Resolved-file bookkeeping and filtering; produces the terminal
    /// snapshot of a successful cycle.
    fn filter_and_retain(
        &self,
        result: MergeTreeResult,
        tree_identity: String,
        dirty_tree_used: bool,
    ) -> ConflictSnapshot {
        let mut state = self.lock_state();

        let raw_paths: BTreeSet<String> = result
            .conflict_files
            .iter()
            .map(|f| f.filepath.clone())
            .collect();
        let inputs_changed = state.merge_tree_identity.as_deref() != Some(tree_identity.as_str())
            || state.raw_paths != raw_paths;
        if inputs_changed && !state.resolved_files.is_empty() {
            info!(
                cleared = state.resolved_files.len(),
                "merge inputs changed, clearing resolved files"
            );
            state.resolved_files.clear();
        }
        state.raw_paths = raw_paths;
        state.merge_tree_identity = Some(tree_identity);
        state.last_dirty_tree_used = dirty_tree_used;
        state.last_result = Some(result.clone());

        build_filtered_snapshot(&result, &state.resolved_files, dirty_tree_used)
    }

    // -- side channels ------------------------------------------------------

    /// Mark a path resolved. Takes effect immediately: when the retained
    /// status is `conflicts`, a fresh filtered snapshot is synthesized and
    /// published without waiting for the next cycle.
    pub fn mark_resolved(&self, path: &str) {
        let mut state = self.lock_state();
        state.resolved_files.insert(path.to_string());
        info!(path, "marked conflict resolved");

        let retained_conflicts = state
            .differ
            .current()
            .map(|s| s.status == DetectionStatus::Conflicts)
            .unwrap_or(false);
        if !retained_conflicts {
            return;
        }
        let Some(result) = state.last_result.clone() else {
            return;
        };
        let snapshot =
            build_filtered_snapshot(&result, &state.resolved_files, state.last_dirty_tree_used);
        let change = state.differ.update(snapshot.clone());
        drop(state);
        self.publish(snapshot, change);
    }

    /// Pause or resume detection. Pausing publishes a `paused` snapshot
    /// immediately; resuming triggers an immediate cycle. Pausing does not
    /// abort an in-flight cycle, only future ones.
    pub async fn set_paused(&self, paused: bool) {
        let was = self.paused.swap(paused, Ordering::SeqCst);
        if was == paused {
            return;
        }
        if paused {
            info!("conflict detection paused");
            let snapshot = ConflictSnapshot::paused();
            let change = self.lock_state().differ.update(snapshot.clone());
            self.publish(snapshot, change);
        } else {
            info!("conflict detection resumed");
            self.run_cycle().await;
        }
    }

    // -- helpers ------------------------------------------------------------

    fn publish(&self, snapshot: ConflictSnapshot, change: StateChange) {
        // Send fails only when no subscriber is listening.
        let _ = self
            .events
            .send(DetectorEvent::SnapshotUpdated { snapshot, change });
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DetectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_config(&self) -> std::sync::RwLockReadGuard<'_, WatchConfig> {
        self.config.read().unwrap_or_else(|e| e.into_inner())
    }
}

/// Filter out resolved paths and classify the result.
fn build_filtered_snapshot(
    result: &MergeTreeResult,
    resolved: &HashSet<String>,
    dirty_tree_used: bool,
) -> ConflictSnapshot {
    let files: Vec<ConflictFileEntry> = result
        .conflict_files
        .iter()
        .filter(|f| !resolved.contains(&f.filepath))
        .cloned()
        .collect();
    if files.is_empty() {
        ConflictSnapshot::clean(result.toplevel_tree_oid.clone(), dirty_tree_used)
    } else {
        ConflictSnapshot::conflicts(files, result.toplevel_tree_oid.clone(), dirty_tree_used)
    }
}

/// RAII guard that clears the in-flight flag when the cycle ends.
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
