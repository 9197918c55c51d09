//! Multi-run ("arena") trajectory polling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use issuedesk_common::{RunStatus, RunTrajectory, SolveRun, TrajectoryEntry, TrajectoryInfo};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::ClientError;

/// Fetches the full current trajectory of one run.
#[async_trait]
pub trait TrajectorySource: Send + Sync {
    async fn fetch_trajectory(
        &self,
        solve_id: &str,
        run_id: &str,
    ) -> Result<RunTrajectory, ClientError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub run_id: String,
    pub model: String,
    pub status: RunStatus,
    pub entries: Vec<TrajectoryEntry>,
    pub info: TrajectoryInfo,
    /// Last fetch failure, cleared on the next success
    pub error: Option<String>,
}

impl From<&SolveRun> for RunSnapshot {
    fn from(run: &SolveRun) -> Self {
        Self {
            run_id: run.id.clone(),
            model: run.model.clone(),
            status: run.status,
            entries: run.trajectory.entries.clone(),
            info: run.trajectory.info.clone(),
            error: None,
        }
    }
}

/// Run id to latest snapshot.
pub type ArenaSnapshot = BTreeMap<String, RunSnapshot>;

pub fn pending_runs(snapshot: &ArenaSnapshot) -> Vec<String> {
    snapshot
        .values()
        .filter(|run| !run.status.is_terminal())
        .map(|run| run.run_id.clone())
        .collect()
}

/// Polls every non-terminal run on a fixed interval until none remain.
pub struct ArenaPoller {
    cancel: CancellationToken,
    snapshot: watch::Receiver<ArenaSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl ArenaPoller {
    pub fn start(
        source: Arc<dyn TrajectorySource>,
        solve_id: impl Into<String>,
        runs: &[SolveRun],
        interval: Duration,
    ) -> Self {
        let initial: ArenaSnapshot = runs
            .iter()
            .map(|run| (run.id.clone(), RunSnapshot::from(run)))
            .collect();
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(initial.clone());

        let poller = Poller {
            source,
            solve_id: solve_id.into(),
            interval,
            runs: initial,
            tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(poller.run());

        Self {
            cancel,
            snapshot: rx,
            task: Some(task),
        }
    }

    pub fn snapshot(&self) -> ArenaSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ArenaSnapshot> {
        self.snapshot.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until polling stops and return the final snapshots.
    pub async fn finished(mut self) -> ArenaSnapshot {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.snapshot()
    }
}

impl Drop for ArenaPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Poller {
    source: Arc<dyn TrajectorySource>,
    solve_id: String,
    interval: Duration,
    runs: ArenaSnapshot,
    tx: watch::Sender<ArenaSnapshot>,
    cancel: CancellationToken,
}

impl Poller {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let pending = pending_runs(&self.runs);
            if pending.is_empty() {
                info!(solve = %self.solve_id, "All runs finished; polling stopped");
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let fetches = pending
                .iter()
                .map(|run_id| self.source.fetch_trajectory(&self.solve_id, run_id));
            let results = tokio::select! {
                _ = self.cancel.cancelled() => break,
                results = join_all(fetches) => results,
            };
            debug!(runs = pending.len(), "Trajectory poll complete");

            let mut unauthorized = false;
            for (run_id, result) in pending.iter().zip(results) {
                let Some(run) = self.runs.get_mut(run_id) else {
                    continue;
                };
                match result {
                    Ok(trajectory) => {
                        run.status = trajectory.status;
                        run.entries = trajectory.trajectory;
                        run.info = trajectory.info;
                        run.error = None;
                    }
                    Err(e) => {
                        warn!(run = %run_id, error = %e, "Trajectory fetch failed");
                        unauthorized |= e.is_unauthorized();
                        run.error = Some(e.to_string());
                    }
                }
            }
            self.tx.send_replace(self.runs.clone());

            if unauthorized {
                warn!("Not authorized; polling stopped");
                break;
            }
        }
    }
}
