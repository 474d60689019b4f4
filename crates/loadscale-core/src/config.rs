//! loadscale.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::serde_str;
use crate::types::PolicySpec;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadscaleConfig {
    pub state: StateConfig,
    pub autoscaler: AutoscalerConfig,
    pub loadtest: LoadTestConfig,
    pub simulation: SimulationConfig,
    /// Policies created at startup.
    #[serde(rename = "policy")]
    pub policies: Vec<PolicySeed>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding `loadscale.redb`. In-memory store when unset.
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscalerConfig {
    /// How often the supervisor reconciles running loops against the
    /// set of active policies.
    #[serde(with = "serde_str")]
    pub reconcile_interval: Duration,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadTestConfig {
    pub max_total_requests: u32,
    pub max_concurrency: u32,
    #[serde(with = "serde_str")]
    pub max_duration: Duration,
    /// Per-request timeout applied by the HTTP client.
    #[serde(with = "serde_str")]
    pub request_timeout: Duration,
    /// How long finished runs stay queryable.
    #[serde(with = "serde_str")]
    pub retention: Duration,
    #[serde(with = "serde_str")]
    pub reap_interval: Duration,
}

impl Default for LoadTestConfig {
    fn default() -> Self {
        Self {
            max_total_requests: 10_000,
            max_concurrency: 100,
            max_duration: Duration::from_secs(300),
            request_timeout: Duration::from_secs(5),
            retention: Duration::from_secs(3600),
            reap_interval: Duration::from_secs(60),
        }
    }
}

/// Parameters of the simulated container runtime used by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// CPU percent consumed by one request per second, spread over replicas.
    pub cpu_per_rps: f64,
    /// CPU percent every replica burns while idle.
    pub baseline_cpu: f64,
    /// Memory percent every replica holds while idle.
    pub baseline_memory: f64,
    /// Memory percent consumed by one request per second, spread over replicas.
    pub memory_per_rps: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cpu_per_rps: 2.0,
            baseline_cpu: 5.0,
            baseline_memory: 20.0,
            memory_per_rps: 0.5,
        }
    }
}

/// A `[[policy]]` entry: a policy spec plus whether to activate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySeed {
    #[serde(flatten)]
    pub spec: PolicySpec,
    #[serde(default)]
    pub active: bool,
}

impl LoadscaleConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LoadscaleConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a background task spin or time out
    /// every request.
    pub fn validate(&self) -> anyhow::Result<()> {
        let periods = [
            ("autoscaler.reconcile_interval", self.autoscaler.reconcile_interval),
            ("loadtest.reap_interval", self.loadtest.reap_interval),
            ("loadtest.request_timeout", self.loadtest.request_timeout),
        ];
        for (name, period) in periods {
            anyhow::ensure!(!period.is_zero(), "{name} must be greater than zero");
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
