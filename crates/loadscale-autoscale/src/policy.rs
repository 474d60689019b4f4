//! Policy validation and partial updates.
//!
//! Every create and update goes through [`validate_policy`], so a stored
//! policy always satisfies `down < target < up` for both metrics and
//! `min <= initial <= max` for replicas.

use loadscale_state::{PolicySpec, ScalingPolicy};

use crate::error::{AutoscaleError, AutoscaleResult};

/// Lowest accepted threshold or target, in percent.
pub const MIN_THRESHOLD: f64 = 10.0;
/// Highest accepted threshold or target, in percent.
pub const MAX_THRESHOLD: f64 = 95.0;
/// Upper bound for `min_replicas`.
pub const MIN_REPLICAS_LIMIT: u32 = 10;
/// Upper bound for `max_replicas`.
pub const MAX_REPLICAS_LIMIT: u32 = 20;
/// Upper bound for `check_interval_seconds`.
pub const MAX_CHECK_INTERVAL_SECS: u64 = 3600;

/// Fields an update may change. `None` leaves the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyUpdate {
    pub policy_name: Option<String>,
    pub min_replicas: Option<u32>,
    pub max_replicas: Option<u32>,
    pub initial_replicas: Option<u32>,
    pub target_cpu: Option<f64>,
    pub cpu_scale_up_threshold: Option<f64>,
    pub cpu_scale_down_threshold: Option<f64>,
    pub target_memory: Option<f64>,
    pub memory_scale_up_threshold: Option<f64>,
    pub memory_scale_down_threshold: Option<f64>,
    pub check_interval_seconds: Option<u64>,
    pub cooldown_seconds: Option<u64>,
    /// Routed through activate/deactivate by the service.
    pub is_active: Option<bool>,
}

impl PolicyUpdate {
    /// Copy every set field onto `policy`. `is_active` is left to the caller.
    pub fn apply_to(&self, policy: &mut ScalingPolicy) {
        if let Some(name) = &self.policy_name {
            policy.policy_name = name.clone();
        }
        set(&mut policy.min_replicas, self.min_replicas);
        set(&mut policy.max_replicas, self.max_replicas);
        set(&mut policy.initial_replicas, self.initial_replicas);
        set(&mut policy.target_cpu, self.target_cpu);
        set(&mut policy.cpu_scale_up_threshold, self.cpu_scale_up_threshold);
        set(&mut policy.cpu_scale_down_threshold, self.cpu_scale_down_threshold);
        set(&mut policy.target_memory, self.target_memory);
        set(&mut policy.memory_scale_up_threshold, self.memory_scale_up_threshold);
        set(&mut policy.memory_scale_down_threshold, self.memory_scale_down_threshold);
        set(&mut policy.check_interval_seconds, self.check_interval_seconds);
        set(&mut policy.cooldown_seconds, self.cooldown_seconds);
    }
}

fn set<T: Copy>(field: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *field = v;
    }
}

/// Validate a creation request.
pub fn validate_spec(spec: &PolicySpec) -> AutoscaleResult<()> {
    validate_policy(&ScalingPolicy::from_spec(0, spec.clone(), 0))
}

/// Validate a complete policy.
pub fn validate_policy(policy: &ScalingPolicy) -> AutoscaleResult<()> {
    if policy.policy_name.trim().is_empty() {
        return Err(invalid("policy name must not be empty"));
    }
    if policy.workload_id.trim().is_empty() {
        return Err(invalid("workload id must not be empty"));
    }

    validate_replicas(policy)?;
    validate_metric(
        "cpu",
        policy.cpu_scale_down_threshold,
        policy.target_cpu,
        policy.cpu_scale_up_threshold,
    )?;
    validate_metric(
        "memory",
        policy.memory_scale_down_threshold,
        policy.target_memory,
        policy.memory_scale_up_threshold,
    )?;

    if policy.check_interval_seconds == 0 || policy.check_interval_seconds > MAX_CHECK_INTERVAL_SECS {
        return Err(invalid(format!(
            "check interval must be between 1 and {MAX_CHECK_INTERVAL_SECS} seconds, got {}",
            policy.check_interval_seconds
        )));
    }

    Ok(())
}

fn validate_replicas(policy: &ScalingPolicy) -> AutoscaleResult<()> {
    let (min, initial, max) = (
        policy.min_replicas,
        policy.initial_replicas,
        policy.max_replicas,
    );
    if min == 0 {
        return Err(invalid("min replicas must be at least 1"));
    }
    if min > MIN_REPLICAS_LIMIT {
        return Err(invalid(format!(
            "min replicas must be at most {MIN_REPLICAS_LIMIT}, got {min}"
        )));
    }
    if max > MAX_REPLICAS_LIMIT {
        return Err(invalid(format!(
            "max replicas must be at most {MAX_REPLICAS_LIMIT}, got {max}"
        )));
    }
    if min > max {
        return Err(invalid(format!(
            "min replicas ({min}) must not exceed max replicas ({max})"
        )));
    }
    if initial < min || initial > max {
        return Err(invalid(format!(
            "initial replicas ({initial}) must be between min ({min}) and max ({max})"
        )));
    }
    Ok(())
}

fn validate_metric(metric: &str, down: f64, target: f64, up: f64) -> AutoscaleResult<()> {
    for (label, value) in [("scale-down threshold", down), ("target", target), ("scale-up threshold", up)] {
        if !value.is_finite() || !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&value) {
            return Err(invalid(format!(
                "{metric} {label} must be between {MIN_THRESHOLD} and {MAX_THRESHOLD}, got {value}"
            )));
        }
    }
    if down >= up {
        return Err(invalid(format!(
            "{metric} scale-down threshold ({down}) must be less than scale-up threshold ({up})"
        )));
    }
    if !(down < target && target < up) {
        return Err(invalid(format!(
            "{metric} target ({target}) must lie strictly between scale-down ({down}) and scale-up ({up}) thresholds"
        )));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> AutoscaleError {
    AutoscaleError::Validation(msg.into())
}
