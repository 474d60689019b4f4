//! Test session registry — submitted runs, their progress, and results.
//!
//! Each run executes on its own task and is the only writer of its entry
//! apart from the registry's status transitions. Finished runs stay
//! queryable for the retention window, then the reaper drops them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use loadscale_core::config::LoadTestConfig;

use crate::error::{LoadTestError, LoadTestResult};
use crate::generator::{LoadGenerator, RunExit, RunTracker};
use crate::stats::LoadTestSummary;
use crate::types::{LoadTestRun, LoadTestSpec, Progress, RunId, RunStatus};

/// Failure reason recorded for cancelled runs.
pub const CANCELLED: &str = "cancelled";

/// Failure reason recorded when a run's task panicked.
pub const PANICKED: &str = "load test task panicked";

/// Floor for the reaper period; a zero interval would spin.
pub const MIN_REAP_INTERVAL: Duration = Duration::from_millis(100);

struct RunEntry {
    spec: LoadTestSpec,
    status: RunStatus,
    summary: Option<LoadTestSummary>,
    failure: Option<String>,
    created_at: u64,
    started_at: Option<u64>,
    finished_at: Option<u64>,
    started: Option<Instant>,
    finished: Option<Instant>,
    tracker: Arc<RunTracker>,
    cancel_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl RunEntry {
    fn elapsed(&self) -> Duration {
        match (self.started, self.finished) {
            (Some(start), Some(end)) => end - start,
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    fn view(&self, id: RunId) -> LoadTestRun {
        LoadTestRun {
            id,
            spec: self.spec.clone(),
            status: self.status,
            summary: self.summary.clone(),
            failure: self.failure.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

pub struct TestRegistry {
    generator: LoadGenerator,
    limits: LoadTestConfig,
    runs: Arc<RwLock<HashMap<RunId, RunEntry>>>,
}

impl TestRegistry {
    pub fn new(generator: LoadGenerator, limits: LoadTestConfig) -> Self {
        Self {
            generator,
            limits,
            runs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn limits(&self) -> &LoadTestConfig {
        &self.limits
    }

    /// Validate and start a run. Returns as soon as the run is scheduled.
    pub async fn submit(&self, spec: LoadTestSpec) -> LoadTestResult<RunId> {
        spec.validate(&self.limits)?;

        let id = RunId::new_v4();
        let tracker = Arc::new(RunTracker::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Held across the spawn so the task cannot observe a missing entry.
        let mut runs = self.runs.write().await;

        let handle = {
            let runs = self.runs.clone();
            let generator = self.generator.clone();
            let spec = spec.clone();
            let tracker = tracker.clone();
            tokio::spawn(async move {
                mark_running(&runs, id).await;
                let exit = generator.run_with(&spec, tracker, cancel_rx).await;
                mark_finished(&runs, id, exit).await;
            })
        };

        info!(
            run_id = %id,
            url = %spec.target,
            total_requests = spec.total_requests,
            concurrency = spec.concurrency,
            "load test submitted"
        );

        runs.insert(
            id,
            RunEntry {
                spec,
                status: RunStatus::Pending,
                summary: None,
                failure: None,
                created_at: epoch_secs(),
                started_at: None,
                finished_at: None,
                started: None,
                finished: None,
                tracker,
                cancel_tx,
                handle: Some(handle),
            },
        );
        Ok(id)
    }

    pub async fn progress(&self, id: RunId) -> LoadTestResult<Progress> {
        let runs = self.runs.read().await;
        let entry = runs.get(&id).ok_or(LoadTestError::NotFound(id))?;

        let elapsed = entry.elapsed();
        let remaining = if entry.status.is_terminal() {
            Duration::ZERO
        } else {
            entry.spec.duration.saturating_sub(elapsed)
        };
        Ok(Progress {
            id,
            status: entry.status,
            completed: entry.tracker.completed(),
            total: entry.spec.total_requests,
            in_flight: entry.tracker.in_flight(),
            elapsed,
            remaining,
        })
    }

    /// The aggregate of a completed run.
    pub async fn result(&self, id: RunId) -> LoadTestResult<LoadTestSummary> {
        let runs = self.runs.read().await;
        let entry = runs.get(&id).ok_or(LoadTestError::NotFound(id))?;
        match (&entry.status, &entry.summary) {
            (RunStatus::Completed, Some(summary)) => Ok(summary.clone()),
            (status, _) => Err(LoadTestError::NotReady { id, status: *status }),
        }
    }

    pub async fn get(&self, id: RunId) -> LoadTestResult<LoadTestRun> {
        let runs = self.runs.read().await;
        runs.get(&id)
            .map(|entry| entry.view(id))
            .ok_or(LoadTestError::NotFound(id))
    }

    /// Every retained run, oldest first.
    pub async fn list(&self) -> Vec<LoadTestRun> {
        let runs = self.runs.read().await;
        let mut all: Vec<LoadTestRun> = runs.iter().map(|(id, e)| e.view(*id)).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    /// Stop a pending or running run and wait for its task to end.
    ///
    /// Returns false if the run had already finished.
    pub async fn cancel(&self, id: RunId) -> LoadTestResult<bool> {
        let handle = {
            let mut runs = self.runs.write().await;
            let entry = runs.get_mut(&id).ok_or(LoadTestError::NotFound(id))?;
            if entry.status.is_terminal() {
                return Ok(false);
            }
            let _ = entry.cancel_tx.send(true);
            entry.handle.take()
        };

        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(run_id = %id, error = %e, "load test task panicked");
            mark_panicked(&self.runs, id).await;
        }
        Ok(true)
    }

    /// Drop a finished run.
    pub async fn remove(&self, id: RunId) -> LoadTestResult<()> {
        let mut runs = self.runs.write().await;
        let entry = runs.get(&id).ok_or(LoadTestError::NotFound(id))?;
        if !entry.status.is_terminal() {
            return Err(LoadTestError::Validation(format!(
                "load test {id} is {}; cancel it before removing",
                entry.status
            )));
        }
        runs.remove(&id);
        debug!(run_id = %id, "load test removed");
        Ok(())
    }

    /// Drop finished runs older than the retention window. Returns how
    /// many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let retention = self.limits.retention;
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, e| match e.finished {
            Some(at) => at.elapsed() < retention,
            None => true,
        });
        let purged = before - runs.len();
        if purged > 0 {
            info!(purged, "expired load tests purged");
        }
        purged
    }

    /// Purge expired runs every `interval` until shutdown.
    pub async fn run_reaper(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let interval = interval.max(MIN_REAP_INTERVAL);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.purge_expired().await;
                }
                _ = shutdown.changed() => {
                    debug!("load test reaper shutting down");
                    break;
                }
            }
        }
    }

    /// Cancel every unfinished run and wait for their tasks.
    pub async fn shutdown(&self) {
        let handles: Vec<(RunId, JoinHandle<()>)> = {
            let mut runs = self.runs.write().await;
            runs.iter_mut()
                .filter(|(_, e)| !e.status.is_terminal())
                .filter_map(|(id, e)| {
                    let _ = e.cancel_tx.send(true);
                    e.handle.take().map(|h| (*id, h))
                })
                .collect()
        };
        for (id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(run_id = %id, error = %e, "load test task panicked");
                mark_panicked(&self.runs, id).await;
            }
        }
        info!("load test registry stopped");
    }
}

async fn mark_running(runs: &RwLock<HashMap<RunId, RunEntry>>, id: RunId) {
    if let Some(entry) = runs.write().await.get_mut(&id) {
        entry.status = RunStatus::Running;
        entry.started = Some(Instant::now());
        entry.started_at = Some(epoch_secs());
    }
}

async fn mark_finished(runs: &RwLock<HashMap<RunId, RunEntry>>, id: RunId, exit: RunExit) {
    let mut runs = runs.write().await;
    let Some(entry) = runs.get_mut(&id) else {
        return;
    };
    entry.finished = Some(Instant::now());
    entry.finished_at = Some(epoch_secs());
    match exit {
        RunExit::Finished(summary) => {
            entry.status = RunStatus::Completed;
            entry.summary = Some(summary);
        }
        RunExit::Cancelled => {
            entry.status = RunStatus::Failed;
            entry.failure = Some(CANCELLED.to_string());
        }
    }
    info!(run_id = %id, status = %entry.status, "load test ended");
}

/// A run whose task died without reporting is failed, so that retention
/// still applies to it.
async fn mark_panicked(runs: &RwLock<HashMap<RunId, RunEntry>>, id: RunId) {
    let mut runs = runs.write().await;
    let Some(entry) = runs.get_mut(&id) else {
        return;
    };
    if entry.status.is_terminal() {
        return;
    }
    entry.status = RunStatus::Failed;
    entry.failure = Some(PANICKED.to_string());
    entry.finished = Some(Instant::now());
    entry.finished_at = Some(epoch_secs());
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
