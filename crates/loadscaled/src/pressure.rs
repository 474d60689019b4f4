//! Pressure bridge — feeds a load test's throughput into a simulated
//! workload's demand.
//!
//! Every interval the bridge samples the run's completed count and sets
//! the workload's demand to the requests finished per second since the
//! previous sample. Demand returns to zero when the run ends.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use loadscale_autoscale::SimulatedCluster;
use loadscale_loadgen::{RunId, TestRegistry};

pub struct PressureBridge {
    registry: Arc<TestRegistry>,
    cluster: Arc<SimulatedCluster>,
    workload_id: String,
    interval: Duration,
}

impl PressureBridge {
    pub fn new(
        registry: Arc<TestRegistry>,
        cluster: Arc<SimulatedCluster>,
        workload_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            cluster,
            workload_id: workload_id.into(),
            interval,
        }
    }

    /// Track `run_id` until it ends or shutdown is signalled.
    pub async fn run(&self, run_id: RunId, mut shutdown: watch::Receiver<bool>) {
        info!(run_id = %run_id, workload = %self.workload_id, "pressure bridge attached");

        let mut last_completed = 0u64;
        let mut last_sample = Instant::now();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }

            let progress = match self.registry.progress(run_id).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "load test vanished, detaching");
                    break;
                }
            };

            let now = Instant::now();
            let rps = observed_rps(last_completed, progress.completed, now - last_sample);
            last_completed = progress.completed;
            last_sample = now;

            self.cluster.set_demand(&self.workload_id, rps);
            debug!(workload = %self.workload_id, rps, completed = progress.completed, "demand updated");

            if progress.status.is_terminal() {
                break;
            }
        }

        self.cluster.set_demand(&self.workload_id, 0.0);
        info!(run_id = %run_id, workload = %self.workload_id, "pressure bridge detached");
    }
}

/// Requests finished per second between two samples.
pub fn observed_rps(previous: u64, current: u64, window: Duration) -> f64 {
    let secs = window.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(previous) as f64 / secs
}
