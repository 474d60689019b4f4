//! Shared types used across loadscale crates.

use serde::{Deserialize, Serialize};

/// Identifier of a scaling policy (assigned by the policy store).
pub type PolicyId = u64;

/// Identifier of the workload (container) a policy scales.
pub type WorkloadId = String;

/// Requested shape of a scaling policy, as submitted by a caller or seeded
/// from `loadscale.toml`.
///
/// Missing fields take the defaults below. Thresholds are percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySpec {
    pub policy_name: String,
    pub workload_id: WorkloadId,

    pub min_replicas: u32,
    pub max_replicas: u32,
    pub initial_replicas: u32,

    pub target_cpu: f64,
    pub cpu_scale_up_threshold: f64,
    pub cpu_scale_down_threshold: f64,

    pub target_memory: f64,
    pub memory_scale_up_threshold: f64,
    pub memory_scale_down_threshold: f64,

    pub check_interval_seconds: u64,
    /// Minimum time between two scaling actions, in either direction.
    pub cooldown_seconds: u64,
}

impl Default for PolicySpec {
    fn default() -> Self {
        Self {
            policy_name: String::new(),
            workload_id: String::new(),
            min_replicas: 1,
            max_replicas: 5,
            initial_replicas: 1,
            target_cpu: 70.0,
            cpu_scale_up_threshold: 80.0,
            cpu_scale_down_threshold: 30.0,
            target_memory: 75.0,
            memory_scale_up_threshold: 85.0,
            memory_scale_down_threshold: 40.0,
            check_interval_seconds: 30,
            cooldown_seconds: 60,
        }
    }
}

impl PolicySpec {
    /// Spec with default bounds and thresholds for the given workload.
    pub fn new(policy_name: &str, workload_id: &str) -> Self {
        Self {
            policy_name: policy_name.to_string(),
            workload_id: workload_id.to_string(),
            ..Self::default()
        }
    }
}
