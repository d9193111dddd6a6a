//! Poll scheduler that drives detection cycles on a configurable interval
//! and supports immediate triggers and configuration reloads.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Notify};
use tokio::time::{self, Interval};
use tracing::{debug, info};

use mergewatch_core::config::WatchConfig;
use mergewatch_core::{ConflictDetector, ProcessRunner};

/// Commands the scheduler accepts while running.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a cycle now and restart the interval from this point.
    TriggerNow,
    /// Swap in a new configuration and rebuild the poll timer.
    Reload(WatchConfig),
}

/// The poll scheduler.
///
/// Ticks on the configured interval while detection is enabled; the detector
/// itself guarantees cycles never overlap, so a tick arriving mid-cycle is
/// simply skipped.
pub struct Scheduler {
    detector: Arc<ConflictDetector<ProcessRunner>>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    interval: Option<Interval>,
}

impl Scheduler {
    pub fn new(
        detector: Arc<ConflictDetector<ProcessRunner>>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        let interval = make_interval(&detector.config());
        Self {
            detector,
            command_rx,
            interval,
        }
    }

    /// Main scheduler loop; runs until `shutdown` is notified. The current
    /// cycle, if any, is always allowed to finish.
    pub async fn run(&mut self, shutdown: Arc<Notify>) {
        let config = self.detector.config();
        info!(
            poll_interval_secs = config.poll_interval().as_secs(),
            enabled = config.enabled,
            "scheduler started"
        );

        // One cycle up front so the first snapshot does not wait a full
        // interval.
        if config.enabled {
            self.detector.run_cycle().await;
        }

        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    info!("scheduler shutting down");
                    break;
                }
                _ = next_tick(&mut self.interval) => {
                    self.detector.run_cycle().await;
                }
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::TriggerNow => {
                info!("immediate detection cycle requested");
                self.detector.run_cycle().await;
                // Do not tick again right after a manual trigger.
                if let Some(interval) = self.interval.as_mut() {
                    interval.reset();
                }
            }
            SchedulerCommand::Reload(config) => {
                info!(
                    repo = %config.repo_path.display(),
                    remote_ref = %config.remote_ref(),
                    poll_interval_secs = config.poll_interval().as_secs(),
                    enabled = config.enabled,
                    "configuration reloaded"
                );
                self.interval = make_interval(&config);
                self.detector.update_config(config);
            }
        }
    }
}

/// Build the poll timer for `config`, or `None` when detection is disabled.
/// The first tick fires a full period from now, not immediately.
fn make_interval(config: &WatchConfig) -> Option<Interval> {
    if !config.enabled {
        debug!("detection disabled, poll timer not armed");
        return None;
    }
    let period = config.poll_interval();
    Some(time::interval_at((Instant::now() + period).into(), period))
}

/// Resolve on the next timer tick, or never when the timer is disarmed.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
