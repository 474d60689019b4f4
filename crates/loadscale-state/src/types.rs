//! Domain types for the loadscale state store.
//!
//! Policies and events are persisted; `ReplicaSnapshot` is the transient
//! reading a metrics source hands to the control loop.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub use loadscale_core::{PolicyId, PolicySpec, WorkloadId};

/// Identifier of a recorded scaling event.
pub type EventId = u64;

// ── Policy ─────────────────────────────────────────────────────────

/// Bounds and thresholds for scaling one workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingPolicy {
    pub id: PolicyId,
    pub policy_name: String,
    pub workload_id: WorkloadId,
    pub is_active: bool,

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
    pub cooldown_seconds: u64,

    /// Unix timestamp (seconds) when this policy was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when this policy was last updated.
    pub updated_at: u64,
}

impl ScalingPolicy {
    /// Build an inactive policy from a spec.
    pub fn from_spec(id: PolicyId, spec: PolicySpec, now: u64) -> Self {
        Self {
            id,
            policy_name: spec.policy_name,
            workload_id: spec.workload_id,
            is_active: false,
            min_replicas: spec.min_replicas,
            max_replicas: spec.max_replicas,
            initial_replicas: spec.initial_replicas,
            target_cpu: spec.target_cpu,
            cpu_scale_up_threshold: spec.cpu_scale_up_threshold,
            cpu_scale_down_threshold: spec.cpu_scale_down_threshold,
            target_memory: spec.target_memory,
            memory_scale_up_threshold: spec.memory_scale_up_threshold,
            memory_scale_down_threshold: spec.memory_scale_down_threshold,
            check_interval_seconds: spec.check_interval_seconds,
            cooldown_seconds: spec.cooldown_seconds,
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Direction of a single-replica scaling step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    ScaleUp,
    ScaleDown,
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleDirection::ScaleUp => write!(f, "scale_up"),
            ScaleDirection::ScaleDown => write!(f, "scale_down"),
        }
    }
}

/// Which reading triggered a scaling action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScaleReason {
    Cpu,
    Memory,
    LowUtilization,
}

impl fmt::Display for ScaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleReason::Cpu => write!(f, "cpu"),
            ScaleReason::Memory => write!(f, "memory"),
            ScaleReason::LowUtilization => write!(f, "low_utilization"),
        }
    }
}

/// Immutable record of one executed scaling action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingEvent {
    /// Assigned by the store on append.
    pub id: EventId,
    pub policy_id: PolicyId,
    pub workload_id: WorkloadId,
    pub event_type: ScaleDirection,
    pub reason: ScaleReason,
    pub replicas_before: u32,
    pub replicas_after: u32,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
}

impl ScalingEvent {
    /// Composite table key: `{policy_id}:{event_id}`, zero-padded so that
    /// lexical order matches insertion order.
    pub fn table_key(&self) -> String {
        format!("{:020}:{:020}", self.policy_id, self.id)
    }

    /// Key prefix shared by every event of a policy.
    pub fn policy_prefix(policy_id: PolicyId) -> String {
        format!("{policy_id:020}:")
    }
}

// ── Metrics ───────────────────────────────────────────────────────

/// A workload reading produced by a metrics source on each poll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ReplicaSnapshot {
    pub replica_count: u32,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
}

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
