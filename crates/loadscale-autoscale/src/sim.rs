//! In-process cluster used by the daemon and tests.
//!
//! Each workload carries a replica count and an offered request rate.
//! Utilization follows the load spread over the replicas:
//!
//! ```text
//! cpu    = baseline_cpu    + demand_rps * cpu_per_rps    / replicas
//! memory = baseline_memory + demand_rps * memory_per_rps / replicas
//! ```
//!
//! Both are clamped to 0..=100.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, bail};
use tracing::debug;

use loadscale_core::config::SimulationConfig;
use loadscale_state::{ReplicaSnapshot, ScaleDirection, epoch_secs};

use crate::runtime::{BoxFuture, MetricsSource, ReplicaManager};

#[derive(Debug, Clone, Copy)]
struct SimWorkload {
    replicas: u32,
    demand_rps: f64,
}

pub struct SimulatedCluster {
    config: SimulationConfig,
    workloads: Mutex<HashMap<String, SimWorkload>>,
}

impl SimulatedCluster {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            workloads: Mutex::new(HashMap::new()),
        }
    }

    /// Add a workload, or reset the replica count of an existing one.
    pub fn register(&self, workload_id: &str, replicas: u32) {
        if let Ok(mut workloads) = self.workloads.lock() {
            workloads
                .entry(workload_id.to_string())
                .and_modify(|w| w.replicas = replicas.max(1))
                .or_insert(SimWorkload {
                    replicas: replicas.max(1),
                    demand_rps: 0.0,
                });
        }
    }

    /// Set the offered load of a workload, registering it with one replica
    /// if it is unknown.
    pub fn set_demand(&self, workload_id: &str, demand_rps: f64) {
        if let Ok(mut workloads) = self.workloads.lock() {
            workloads
                .entry(workload_id.to_string())
                .or_insert(SimWorkload {
                    replicas: 1,
                    demand_rps: 0.0,
                })
                .demand_rps = demand_rps.max(0.0);
        }
    }

    pub fn replicas(&self, workload_id: &str) -> Option<u32> {
        self.workloads
            .lock()
            .ok()?
            .get(workload_id)
            .map(|w| w.replicas)
    }

    pub fn demand(&self, workload_id: &str) -> Option<f64> {
        self.workloads
            .lock()
            .ok()?
            .get(workload_id)
            .map(|w| w.demand_rps)
    }

    fn snapshot(&self, workload_id: &str) -> anyhow::Result<ReplicaSnapshot> {
        let workloads = self
            .workloads
            .lock()
            .map_err(|_| anyhow!("simulated cluster lock poisoned"))?;
        let w = workloads
            .get(workload_id)
            .ok_or_else(|| anyhow!("unknown workload {workload_id}"))?;

        let per_replica = w.demand_rps / w.replicas as f64;
        let c = &self.config;
        Ok(ReplicaSnapshot {
            replica_count: w.replicas,
            cpu_percent: (c.baseline_cpu + per_replica * c.cpu_per_rps).clamp(0.0, 100.0),
            memory_percent: (c.baseline_memory + per_replica * c.memory_per_rps).clamp(0.0, 100.0),
            timestamp: epoch_secs(),
        })
    }

    fn apply(&self, workload_id: &str, direction: ScaleDirection) -> anyhow::Result<u32> {
        let mut workloads = self
            .workloads
            .lock()
            .map_err(|_| anyhow!("simulated cluster lock poisoned"))?;
        let w = workloads
            .get_mut(workload_id)
            .ok_or_else(|| anyhow!("unknown workload {workload_id}"))?;

        match direction {
            ScaleDirection::ScaleUp => w.replicas += 1,
            ScaleDirection::ScaleDown => {
                if w.replicas <= 1 {
                    bail!("workload {workload_id} cannot drop below one replica");
                }
                w.replicas -= 1;
            }
        }
        debug!(workload = workload_id, replicas = w.replicas, %direction, "simulated replica change");
        Ok(w.replicas)
    }
}

impl MetricsSource for SimulatedCluster {
    fn poll<'a>(&'a self, workload_id: &'a str) -> BoxFuture<'a, anyhow::Result<ReplicaSnapshot>> {
        Box::pin(async move { self.snapshot(workload_id) })
    }
}

impl ReplicaManager for SimulatedCluster {
    fn scale<'a>(
        &'a self,
        workload_id: &'a str,
        direction: ScaleDirection,
    ) -> BoxFuture<'a, anyhow::Result<u32>> {
        Box::pin(async move { self.apply(workload_id, direction) })
    }
}
