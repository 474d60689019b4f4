//! Subsystem wiring for `loadscaled run`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use loadscale_autoscale::{Autoscaler, ScalingService, SimulatedCluster, render_prometheus};
use loadscale_core::LoadscaleConfig;
use loadscale_loadgen::{HttpClient, HyperClient, LoadGenerator, LoadTestSpec, TestRegistry};
use loadscale_state::{PolicyStore, StateStore};

use crate::pressure::PressureBridge;

/// How often the pressure bridge samples a driving load test.
const PRESSURE_INTERVAL: Duration = Duration::from_secs(1);

/// A load test whose throughput becomes a workload's demand.
#[derive(Debug, Clone)]
pub struct Drive {
    pub spec: LoadTestSpec,
    pub workload_id: String,
}

pub struct Daemon {
    config: LoadscaleConfig,
    cluster: Arc<SimulatedCluster>,
    autoscaler: Arc<Autoscaler>,
    service: Arc<ScalingService>,
    registry: Arc<TestRegistry>,
}

impl Daemon {
    /// Open the store named by the config and wire the subsystems with a
    /// real HTTP client.
    pub fn open(config: LoadscaleConfig) -> anyhow::Result<Self> {
        let client = Arc::new(HyperClient::new(config.loadtest.request_timeout));
        Self::with_client(config, client)
    }

    pub fn with_client(config: LoadscaleConfig, client: Arc<dyn HttpClient>) -> anyhow::Result<Self> {
        config.validate()?;
        let store: Arc<dyn PolicyStore> = match &config.state.data_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join("loadscale.redb");
                let store = StateStore::open(&path)?;
                info!(path = ?path, "state store opened");
                Arc::new(store)
            }
            None => {
                info!("using in-memory state store");
                Arc::new(StateStore::open_in_memory()?)
            }
        };

        let cluster = Arc::new(SimulatedCluster::new(config.simulation.clone()));
        let autoscaler = Arc::new(Autoscaler::new(store.clone(), cluster.clone(), cluster.clone()));
        let service = Arc::new(ScalingService::new(store, autoscaler.clone()));
        let registry = Arc::new(TestRegistry::new(
            LoadGenerator::new(client),
            config.loadtest.clone(),
        ));

        Ok(Self {
            config,
            cluster,
            autoscaler,
            service,
            registry,
        })
    }

    pub fn cluster(&self) -> &Arc<SimulatedCluster> {
        &self.cluster
    }

    pub fn service(&self) -> &Arc<ScalingService> {
        &self.service
    }

    pub fn registry(&self) -> &Arc<TestRegistry> {
        &self.registry
    }

    /// Create the configured seed policies that are not stored yet, and
    /// register every stored policy's workload with the simulated cluster.
    pub async fn seed(&self) -> anyhow::Result<()> {
        for seed in &self.config.policies {
            let existing = self.service.list_policies()?.into_iter().find(|p| {
                p.policy_name == seed.spec.policy_name && p.workload_id == seed.spec.workload_id
            });
            let policy = match existing {
                Some(p) => p,
                None => self.service.create_policy(seed.spec.clone()).await?,
            };
            if seed.active && !policy.is_active {
                self.service.activate(policy.id).await?;
            }
        }

        for policy in self.service.list_policies()? {
            if self.cluster.replicas(&policy.workload_id).is_none() {
                self.cluster.register(&policy.workload_id, policy.initial_replicas);
                debug!(workload = %policy.workload_id, replicas = policy.initial_replicas, "simulated workload registered");
            }
        }
        Ok(())
    }

    /// Run until `shutdown` flips, then stop every loop and load test.
    pub async fn run(&self, drive: Option<Drive>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        self.seed().await?;

        let autoscale_handle = {
            let autoscaler = self.autoscaler.clone();
            let interval = self.config.autoscaler.reconcile_interval;
            let rx = shutdown.clone();
            tokio::spawn(async move { autoscaler.run(interval, rx).await })
        };

        let reaper_handle = {
            let registry = self.registry.clone();
            let interval = self.config.loadtest.reap_interval;
            let rx = shutdown.clone();
            tokio::spawn(async move { registry.run_reaper(interval, rx).await })
        };

        let bridge_handle = match drive {
            Some(drive) => {
                if self.cluster.replicas(&drive.workload_id).is_none() {
                    warn!(workload = %drive.workload_id, "driven workload has no policy, registering it with one replica");
                    self.cluster.register(&drive.workload_id, 1);
                }
                let run_id = self.registry.submit(drive.spec).await?;
                let bridge = PressureBridge::new(
                    self.registry.clone(),
                    self.cluster.clone(),
                    drive.workload_id,
                    PRESSURE_INTERVAL,
                );
                let rx = shutdown.clone();
                Some(tokio::spawn(async move { bridge.run(run_id, rx).await }))
            }
            None => None,
        };

        info!("loadscaled running");
        // An Err means the sender is gone, which is a shutdown too.
        let _ = shutdown.changed().await;
        info!("shutdown signal received");

        self.registry.shutdown().await;
        if let Some(handle) = bridge_handle {
            let _ = handle.await;
        }
        let _ = reaper_handle.await;
        let _ = autoscale_handle.await;

        let final_stats = self.autoscaler.all_stats().await;
        debug!(stats = %render_prometheus(&final_stats), "final loop counters");
        info!("loadscaled stopped");
        Ok(())
    }
}
