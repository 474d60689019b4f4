//! Policy lifecycle — create, update, activate, deactivate, delete.
//!
//! Lifecycle calls are serialized by one async mutex so the
//! one-active-policy-per-workload check cannot race with a concurrent
//! activation. Loops read policies by copy, so an update never touches a
//! decision already in progress; it takes effect on the next tick.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use loadscale_state::{PolicyId, PolicySpec, PolicyStore, ScalingEvent, ScalingPolicy, epoch_secs};

use crate::controller::Autoscaler;
use crate::error::{AutoscaleError, AutoscaleResult};
use crate::policy::{PolicyUpdate, validate_policy, validate_spec};
use crate::stats::LoopStatsSnapshot;

pub struct ScalingService {
    store: Arc<dyn PolicyStore>,
    autoscaler: Arc<Autoscaler>,
    lifecycle: Mutex<()>,
}

impl ScalingService {
    pub fn new(store: Arc<dyn PolicyStore>, autoscaler: Arc<Autoscaler>) -> Self {
        Self {
            store,
            autoscaler,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn autoscaler(&self) -> &Arc<Autoscaler> {
        &self.autoscaler
    }

    /// Validate and store a new, inactive policy.
    pub async fn create_policy(&self, spec: PolicySpec) -> AutoscaleResult<ScalingPolicy> {
        validate_spec(&spec)?;
        let _guard = self.lifecycle.lock().await;

        let id = self.store.next_policy_id()?;
        let policy = ScalingPolicy::from_spec(id, spec, epoch_secs());
        self.store.put_policy(&policy)?;

        info!(
            policy_id = id,
            name = %policy.policy_name,
            workload = %policy.workload_id,
            "scaling policy created"
        );
        Ok(policy)
    }

    pub fn get_policy(&self, id: PolicyId) -> AutoscaleResult<ScalingPolicy> {
        self.store.get_policy(id)?.ok_or(AutoscaleError::NotFound(id))
    }

    pub fn list_policies(&self) -> AutoscaleResult<Vec<ScalingPolicy>> {
        Ok(self.store.list_policies()?)
    }

    /// Apply a partial update. The merged policy must pass validation.
    ///
    /// A change of `is_active` starts or stops the loop before returning.
    pub async fn update_policy(
        &self,
        id: PolicyId,
        update: PolicyUpdate,
    ) -> AutoscaleResult<ScalingPolicy> {
        let _guard = self.lifecycle.lock().await;

        let mut policy = self.get_policy(id)?;
        let was_active = policy.is_active;
        update.apply_to(&mut policy);
        if let Some(active) = update.is_active {
            policy.is_active = active;
        }
        validate_policy(&policy)?;
        if policy.is_active {
            self.ensure_workload_free(&policy)?;
        }

        policy.updated_at = epoch_secs();
        self.store.put_policy(&policy)?;
        info!(policy_id = id, "scaling policy updated");

        match (was_active, policy.is_active) {
            (false, true) => {
                self.autoscaler.start_loop(&policy).await;
            }
            (true, false) => {
                self.autoscaler.stop_loop(id).await;
            }
            _ => {}
        }
        Ok(policy)
    }

    /// Mark a policy active and start its loop.
    pub async fn activate(&self, id: PolicyId) -> AutoscaleResult<ScalingPolicy> {
        let _guard = self.lifecycle.lock().await;

        let mut policy = self.get_policy(id)?;
        if !policy.is_active {
            self.ensure_workload_free(&policy)?;
            policy.is_active = true;
            policy.updated_at = epoch_secs();
            self.store.put_policy(&policy)?;
        }
        self.autoscaler.start_loop(&policy).await;

        info!(policy_id = id, workload = %policy.workload_id, "auto-scaling started");
        Ok(policy)
    }

    /// Mark a policy inactive. Returns once its loop has terminated.
    pub async fn deactivate(&self, id: PolicyId) -> AutoscaleResult<ScalingPolicy> {
        let _guard = self.lifecycle.lock().await;

        let mut policy = self.get_policy(id)?;
        if policy.is_active {
            policy.is_active = false;
            policy.updated_at = epoch_secs();
            self.store.put_policy(&policy)?;
        }
        self.autoscaler.stop_loop(id).await;

        info!(policy_id = id, "auto-scaling stopped");
        Ok(policy)
    }

    /// Delete a policy. Active policies need `force`, which also stops
    /// the loop before the record goes away.
    pub async fn delete_policy(&self, id: PolicyId, force: bool) -> AutoscaleResult<()> {
        let _guard = self.lifecycle.lock().await;

        let policy = self.get_policy(id)?;
        if policy.is_active && !force {
            return Err(AutoscaleError::PolicyActive(id));
        }

        self.autoscaler.stop_loop(id).await;
        self.store.delete_policy(id)?;
        self.autoscaler.forget(id).await;

        info!(policy_id = id, forced = force && policy.is_active, "scaling policy deleted");
        Ok(())
    }

    /// A policy's scaling history, oldest first.
    pub fn list_events(&self, id: PolicyId) -> AutoscaleResult<Vec<ScalingEvent>> {
        self.get_policy(id)?;
        Ok(self.store.list_events(id)?)
    }

    pub async fn loop_stats(&self, id: PolicyId) -> AutoscaleResult<Option<LoopStatsSnapshot>> {
        self.get_policy(id)?;
        Ok(self.autoscaler.stats(id).await)
    }

    /// Reject activating a second policy on a workload that already has one.
    fn ensure_workload_free(&self, policy: &ScalingPolicy) -> AutoscaleResult<()> {
        let conflict = self
            .store
            .get_active_policies()?
            .into_iter()
            .find(|p| p.id != policy.id && p.workload_id == policy.workload_id);
        match conflict {
            Some(other) => Err(AutoscaleError::Validation(format!(
                "workload {} is already scaled by active policy {}",
                policy.workload_id, other.id
            ))),
            None => Ok(()),
        }
    }
}
