//! Decision engine — maps one metrics reading to a scaling decision.
//!
//! Pure and deterministic: no clock, no I/O, no state carried between
//! calls. The caller supplies the time since its last executed action.

use std::time::Duration;

use loadscale_state::{ReplicaSnapshot, ScaleDirection, ScaleReason, ScalingPolicy};

/// Outcome of evaluating a policy against a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Add one replica.
    ScaleUp(ScaleReason),
    /// Remove one replica.
    ScaleDown(ScaleReason),
    /// Leave the replica count alone.
    NoChange,
}

impl Decision {
    pub fn direction(&self) -> Option<ScaleDirection> {
        match self {
            Decision::ScaleUp(_) => Some(ScaleDirection::ScaleUp),
            Decision::ScaleDown(_) => Some(ScaleDirection::ScaleDown),
            Decision::NoChange => None,
        }
    }

    pub fn reason(&self) -> Option<ScaleReason> {
        match self {
            Decision::ScaleUp(r) | Decision::ScaleDown(r) => Some(*r),
            Decision::NoChange => None,
        }
    }
}

/// Decide whether `policy` wants to scale given `snapshot`.
///
/// Rules, first match wins:
///
/// 1. Inside the cooldown window → `NoChange`, whatever the readings.
///    `None` for `since_last_scale` means no action has run yet.
/// 2. CPU **or** memory above its scale-up threshold, below `max_replicas`
///    → `ScaleUp` (reason `cpu` when CPU breached, otherwise `memory`).
/// 3. CPU **and** memory below their scale-down thresholds, above
///    `min_replicas` → `ScaleDown(LowUtilization)`.
/// 4. Otherwise `NoChange`.
pub fn decide(
    policy: &ScalingPolicy,
    snapshot: &ReplicaSnapshot,
    replicas: u32,
    since_last_scale: Option<Duration>,
) -> Decision {
    let cooldown = Duration::from_secs(policy.cooldown_seconds);
    if since_last_scale.is_some_and(|elapsed| elapsed < cooldown) {
        return Decision::NoChange;
    }

    let cpu_high = snapshot.cpu_percent > policy.cpu_scale_up_threshold;
    let memory_high = snapshot.memory_percent > policy.memory_scale_up_threshold;
    if (cpu_high || memory_high) && replicas < policy.max_replicas {
        let reason = if cpu_high {
            ScaleReason::Cpu
        } else {
            ScaleReason::Memory
        };
        return Decision::ScaleUp(reason);
    }

    let cpu_low = snapshot.cpu_percent < policy.cpu_scale_down_threshold;
    let memory_low = snapshot.memory_percent < policy.memory_scale_down_threshold;
    if cpu_low && memory_low && replicas > policy.min_replicas {
        return Decision::ScaleDown(ScaleReason::LowUtilization);
    }

    Decision::NoChange
}
