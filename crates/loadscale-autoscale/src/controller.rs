//! Autoscaler — one control loop per active policy.
//!
//! Each loop is a tokio task with its own timer and shutdown channel.
//! Its counters and cooldown clock belong to the [`Autoscaler`] and
//! outlive the task:
//!
//! ```text
//! Idle ──interval──▶ Polling ──▶ Deciding ──▶ Applying ──▶ Idle
//!   ▲                   │ fetch failed     │ NoChange
//!   └───────────────────┴──────────────────┘
//! ```
//!
//! The [`Autoscaler`] owns the loop handles. Its supervisor tick
//! reconciles them against the store's active policies; stopping a loop
//! waits for the task to finish.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use loadscale_state::{
    PolicyId, PolicyStore, ScalingEvent, ScalingPolicy, StateResult, epoch_secs,
};

use crate::decision::decide;
use crate::runtime::{MetricsSource, ReplicaManager};
use crate::stats::{LoopStats, LoopStatsSnapshot};

/// What a single loop tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The metrics source failed; nothing else happened.
    MetricsUnavailable,
    /// The decision engine asked for no change.
    Held,
    /// A replica was added or removed and the event recorded.
    Scaled(ScalingEvent),
    /// The replica manager refused; cooldown left untouched.
    ScaleFailed,
}

/// When a policy last scaled successfully.
///
/// Owned by the [`Autoscaler`] rather than the loop task, so the cooldown
/// still holds after a deactivate/activate cycle or a supervisor restart.
#[derive(Debug, Default)]
pub struct ScaleClock(std::sync::Mutex<Option<Instant>>);

impl ScaleClock {
    pub fn since_last_scale(&self) -> Option<Duration> {
        let last = *self.0.lock().unwrap_or_else(|e| e.into_inner());
        last.map(|at| at.elapsed())
    }

    pub fn mark(&self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }
}

/// Floor for the supervisor period; a zero interval would spin.
pub const MIN_RECONCILE_INTERVAL: Duration = Duration::from_millis(100);

/// The state machine behind one policy's loop.
pub struct PolicyLoop {
    policy_id: PolicyId,
    store: Arc<dyn PolicyStore>,
    metrics: Arc<dyn MetricsSource>,
    replicas: Arc<dyn ReplicaManager>,
    stats: Arc<LoopStats>,
    clock: Arc<ScaleClock>,
}

impl PolicyLoop {
    pub fn new(
        policy_id: PolicyId,
        store: Arc<dyn PolicyStore>,
        metrics: Arc<dyn MetricsSource>,
        replicas: Arc<dyn ReplicaManager>,
        stats: Arc<LoopStats>,
        clock: Arc<ScaleClock>,
    ) -> Self {
        Self {
            policy_id,
            store,
            metrics,
            replicas,
            stats,
            clock,
        }
    }

    /// Poll, decide, and apply once against a policy snapshot.
    pub async fn tick(&mut self, policy: &ScalingPolicy) -> TickOutcome {
        self.stats.record_tick();

        // Polling.
        let snapshot = match self.metrics.poll(&policy.workload_id).await {
            Ok(s) => s,
            Err(e) => {
                self.stats.record_metric_failure();
                warn!(
                    policy_id = self.policy_id,
                    workload = %policy.workload_id,
                    error = %e,
                    "metrics poll failed, skipping tick"
                );
                return TickOutcome::MetricsUnavailable;
            }
        };
        self.stats.record_replicas(snapshot.replica_count);

        // Deciding.
        let since_last_scale = self.clock.since_last_scale();
        let decision = decide(policy, &snapshot, snapshot.replica_count, since_last_scale);
        let (Some(direction), Some(reason)) = (decision.direction(), decision.reason()) else {
            debug!(
                policy_id = self.policy_id,
                cpu = snapshot.cpu_percent,
                memory = snapshot.memory_percent,
                replicas = snapshot.replica_count,
                "no scaling needed"
            );
            return TickOutcome::Held;
        };

        // Applying.
        let replicas_after = match self.replicas.scale(&policy.workload_id, direction).await {
            Ok(n) => n,
            Err(e) => {
                self.stats.record_replica_failure();
                warn!(
                    policy_id = self.policy_id,
                    workload = %policy.workload_id,
                    %direction,
                    error = %e,
                    "scaling action failed"
                );
                return TickOutcome::ScaleFailed;
            }
        };
        self.clock.mark();
        self.stats.record_scale(direction, replicas_after);

        let event = ScalingEvent {
            id: 0,
            policy_id: self.policy_id,
            workload_id: policy.workload_id.clone(),
            event_type: direction,
            reason,
            replicas_before: snapshot.replica_count,
            replicas_after,
            timestamp: epoch_secs(),
        };

        info!(
            policy_id = self.policy_id,
            workload = %policy.workload_id,
            %direction,
            %reason,
            from = snapshot.replica_count,
            to = replicas_after,
            cpu = snapshot.cpu_percent,
            memory = snapshot.memory_percent,
            "scaled workload"
        );

        match self.store.append_event(event.clone()) {
            Ok(stored) => TickOutcome::Scaled(stored),
            Err(e) => {
                error!(policy_id = self.policy_id, error = %e, "failed to record scaling event");
                TickOutcome::Scaled(event)
            }
        }
    }

    /// Run until shutdown, or until the policy disappears or is deactivated.
    pub async fn run(mut self, mut interval: Duration, mut shutdown: watch::Receiver<bool>) {
        debug!(policy_id = self.policy_id, "policy loop starting");

        loop {
            // Idle.
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    debug!(policy_id = self.policy_id, "policy loop shutting down");
                    break;
                }
            }

            // Copy-on-read: the tick works on its own snapshot of the policy.
            let policy = match self.store.get_policy(self.policy_id) {
                Ok(Some(p)) if p.is_active => p,
                Ok(_) => {
                    info!(policy_id = self.policy_id, "policy removed or inactive, loop exiting");
                    break;
                }
                Err(e) => {
                    error!(policy_id = self.policy_id, error = %e, "failed to read policy");
                    continue;
                }
            };
            interval = Duration::from_secs(policy.check_interval_seconds.max(1));

            self.tick(&policy).await;
        }
    }
}

/// A running policy loop.
struct LoopSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owns every policy loop and the counters they write.
pub struct Autoscaler {
    store: Arc<dyn PolicyStore>,
    metrics: Arc<dyn MetricsSource>,
    replicas: Arc<dyn ReplicaManager>,
    /// Running loops: policy_id → slot.
    loops: Arc<RwLock<HashMap<PolicyId, LoopSlot>>>,
    /// Counters survive a loop restart; dropped when the policy is forgotten.
    stats: Arc<RwLock<HashMap<PolicyId, Arc<LoopStats>>>>,
    /// Cooldown clocks, kept the same way as the counters.
    clocks: Arc<RwLock<HashMap<PolicyId, Arc<ScaleClock>>>>,
}

impl Autoscaler {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        metrics: Arc<dyn MetricsSource>,
        replicas: Arc<dyn ReplicaManager>,
    ) -> Self {
        Self {
            store,
            metrics,
            replicas,
            loops: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(HashMap::new())),
            clocks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Start the loop for `policy` unless one is already running.
    ///
    /// The policy is re-read from the store under the loop lock and only
    /// started if it is still active there, so a caller holding an older
    /// copy cannot revive a policy that was deactivated meanwhile.
    /// Returns true if a new loop was spawned.
    pub async fn start_loop(&self, policy: &ScalingPolicy) -> bool {
        let mut loops = self.loops.write().await;
        if let Some(slot) = loops.get(&policy.id)
            && !slot.handle.is_finished()
        {
            return false;
        }

        let policy = match self.store.get_policy(policy.id) {
            Ok(Some(p)) if p.is_active => p,
            Ok(_) => {
                debug!(policy_id = policy.id, "policy no longer active, not starting loop");
                return false;
            }
            Err(e) => {
                error!(policy_id = policy.id, error = %e, "failed to read policy");
                return false;
            }
        };

        let stats = {
            let mut stats = self.stats.write().await;
            stats.entry(policy.id).or_default().clone()
        };
        let clock = {
            let mut clocks = self.clocks.write().await;
            clocks.entry(policy.id).or_default().clone()
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let policy_loop = PolicyLoop::new(
            policy.id,
            self.store.clone(),
            self.metrics.clone(),
            self.replicas.clone(),
            stats,
            clock,
        );
        let interval = Duration::from_secs(policy.check_interval_seconds.max(1));
        let handle = tokio::spawn(policy_loop.run(interval, shutdown_rx));

        loops.insert(
            policy.id,
            LoopSlot {
                handle,
                shutdown_tx,
            },
        );

        info!(
            policy_id = policy.id,
            workload = %policy.workload_id,
            interval_secs = interval.as_secs(),
            "policy loop started"
        );
        true
    }

    /// Stop a policy's loop and wait for it to finish.
    ///
    /// Returns true if a loop was registered.
    pub async fn stop_loop(&self, policy_id: PolicyId) -> bool {
        let slot = self.loops.write().await.remove(&policy_id);
        match slot {
            Some(slot) => {
                let _ = slot.shutdown_tx.send(true);
                if let Err(e) = slot.handle.await {
                    error!(policy_id, error = %e, "policy loop panicked");
                }
                info!(policy_id, "policy loop stopped");
                true
            }
            None => false,
        }
    }

    /// Stop a policy's loop unless the store says it is active.
    ///
    /// The check and the slot removal happen under the loop lock, so an
    /// activation that lands after the caller's snapshot keeps its loop.
    pub async fn stop_if_inactive(&self, policy_id: PolicyId) -> bool {
        let slot = {
            let mut loops = self.loops.write().await;
            match self.store.get_policy(policy_id) {
                Ok(Some(p)) if p.is_active => return false,
                Ok(_) => {}
                Err(e) => {
                    error!(policy_id, error = %e, "failed to read policy");
                    return false;
                }
            }
            loops.remove(&policy_id)
        };
        match slot {
            Some(slot) => {
                let _ = slot.shutdown_tx.send(true);
                if let Err(e) = slot.handle.await {
                    error!(policy_id, error = %e, "policy loop panicked");
                }
                info!(policy_id, "stale policy loop stopped");
                true
            }
            None => false,
        }
    }

    /// Stop all loops (for graceful shutdown).
    pub async fn stop_all(&self) {
        let slots: Vec<(PolicyId, LoopSlot)> = self.loops.write().await.drain().collect();
        for (_, slot) in &slots {
            let _ = slot.shutdown_tx.send(true);
        }
        for (policy_id, slot) in slots {
            if let Err(e) = slot.handle.await {
                error!(policy_id, error = %e, "policy loop panicked");
            }
        }
        info!("all policy loops stopped");
    }

    /// Drop the counters and cooldown clock of a deleted policy.
    pub async fn forget(&self, policy_id: PolicyId) {
        self.stats.write().await.remove(&policy_id);
        self.clocks.write().await.remove(&policy_id);
    }

    /// Whether a live loop exists for the policy.
    pub async fn is_running(&self, policy_id: PolicyId) -> bool {
        let loops = self.loops.read().await;
        loops
            .get(&policy_id)
            .is_some_and(|slot| !slot.handle.is_finished())
    }

    /// Policy ids with a live loop.
    pub async fn running_loops(&self) -> Vec<PolicyId> {
        let loops = self.loops.read().await;
        let mut ids: Vec<PolicyId> = loops
            .iter()
            .filter(|(_, slot)| !slot.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Counters for one policy, if it ever ran.
    pub async fn stats(&self, policy_id: PolicyId) -> Option<LoopStatsSnapshot> {
        let stats = self.stats.read().await;
        stats.get(&policy_id).map(|s| s.snapshot(policy_id))
    }

    /// Counters for every policy that ever ran, ordered by id.
    pub async fn all_stats(&self) -> Vec<LoopStatsSnapshot> {
        let stats = self.stats.read().await;
        let mut all: Vec<LoopStatsSnapshot> =
            stats.iter().map(|(id, s)| s.snapshot(*id)).collect();
        all.sort_unstable_by_key(|s| s.policy_id);
        all
    }

    /// Bring the running loops in line with the store's active policies.
    pub async fn reconcile(&self) -> StateResult<()> {
        let active = self.store.get_active_policies()?;
        let wanted: HashSet<PolicyId> = active.iter().map(|p| p.id).collect();

        for policy in &active {
            self.start_loop(policy).await;
        }

        let stale: Vec<PolicyId> = {
            let loops = self.loops.read().await;
            loops
                .keys()
                .filter(|id| !wanted.contains(id))
                .copied()
                .collect()
        };
        for policy_id in stale {
            self.stop_if_inactive(policy_id).await;
        }

        debug!(active = wanted.len(), "autoscaler reconciled");
        Ok(())
    }

    /// Run the supervisor until shutdown, then stop every loop.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let interval = interval.max(MIN_RECONCILE_INTERVAL);
        info!(interval_secs = interval.as_secs(), "autoscaler started");

        if let Err(e) = self.reconcile().await {
            error!(error = %e, "autoscaler reconcile failed");
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.reconcile().await {
                        error!(error = %e, "autoscaler reconcile failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("autoscaler shutting down");
                    break;
                }
            }
        }

        self.stop_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use loadscale_state::{
        PolicySpec, ReplicaSnapshot, ScaleDirection, ScaleReason, StateStore,
    };

    use crate::runtime::BoxFuture;

    /// Replays a fixed sequence of readings; errors once exhausted.
    struct ScriptedMetrics {
        readings: Mutex<VecDeque<anyhow::Result<(f64, f64)>>>,
        replicas: Arc<Mutex<u32>>,
    }

    impl MetricsSource for ScriptedMetrics {
        fn poll<'a>(&'a self, _workload_id: &'a str) -> BoxFuture<'a, anyhow::Result<ReplicaSnapshot>> {
            Box::pin(async move {
                let next = self
                    .readings
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")));
                let (cpu, memory) = next?;
                Ok(ReplicaSnapshot {
                    replica_count: *self.replicas.lock().unwrap(),
                    cpu_percent: cpu,
                    memory_percent: memory,
                    timestamp: 0,
                })
            })
        }
    }

    /// Applies scaling to a shared counter, optionally failing.
    struct CountingReplicas {
        replicas: Arc<Mutex<u32>>,
        fail: bool,
        calls: Mutex<u32>,
    }

    impl ReplicaManager for CountingReplicas {
        fn scale<'a>(
            &'a self,
            _workload_id: &'a str,
            direction: ScaleDirection,
        ) -> BoxFuture<'a, anyhow::Result<u32>> {
            Box::pin(async move {
                *self.calls.lock().unwrap() += 1;
                if self.fail {
                    anyhow::bail!("runtime unavailable");
                }
                let mut n = self.replicas.lock().unwrap();
                match direction {
                    ScaleDirection::ScaleUp => *n += 1,
                    ScaleDirection::ScaleDown => *n -= 1,
                }
                Ok(*n)
            })
        }
    }

    struct Harness {
        store: Arc<StateStore>,
        metrics: Arc<ScriptedMetrics>,
        replicas: Arc<CountingReplicas>,
        policy: ScalingPolicy,
    }

    fn harness(readings: Vec<anyhow::Result<(f64, f64)>>, start: u32, fail: bool) -> Harness {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let count = Arc::new(Mutex::new(start));
        let metrics = Arc::new(ScriptedMetrics {
            readings: Mutex::new(readings.into()),
            replicas: count.clone(),
        });
        let replicas = Arc::new(CountingReplicas {
            replicas: count,
            fail,
            calls: Mutex::new(0),
        });

        let mut spec = PolicySpec::new("web", "web-1");
        spec.check_interval_seconds = 10;
        spec.cooldown_seconds = 60;
        let id = store.next_policy_id().unwrap();
        let mut policy = ScalingPolicy::from_spec(id, spec, 0);
        policy.is_active = true;
        store.put_policy(&policy).unwrap();

        Harness {
            store,
            metrics,
            replicas,
            policy,
        }
    }

    impl Harness {
        fn policy_loop(&self) -> PolicyLoop {
            PolicyLoop::new(
                self.policy.id,
                self.store.clone(),
                self.metrics.clone(),
                self.replicas.clone(),
                Arc::new(LoopStats::default()),
                Arc::new(ScaleClock::default()),
            )
        }

        fn autoscaler(&self) -> Autoscaler {
            Autoscaler::new(self.store.clone(), self.metrics.clone(), self.replicas.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn tick_scales_and_records_event() {
        let h = harness(vec![Ok((90.0, 50.0))], 1, false);
        let mut pl = h.policy_loop();

        let outcome = pl.tick(&h.policy).await;
        let TickOutcome::Scaled(event) = outcome else {
            panic!("expected a scaling action, got {outcome:?}");
        };
        assert_eq!(event.event_type, ScaleDirection::ScaleUp);
        assert_eq!(event.reason, ScaleReason::Cpu);
        assert_eq!((event.replicas_before, event.replicas_after), (1, 2));
        assert!(event.id > 0);

        assert_eq!(h.store.list_events(h.policy.id).unwrap(), vec![event]);
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_failure_is_a_noop_tick() {
        let h = harness(vec![Err(anyhow::anyhow!("stats endpoint down")), Ok((90.0, 50.0))], 1, false);
        let stats = Arc::new(LoopStats::default());
        let mut pl = PolicyLoop::new(
            h.policy.id,
            h.store.clone(),
            h.metrics.clone(),
            h.replicas.clone(),
            stats.clone(),
            Arc::new(ScaleClock::default()),
        );

        assert_eq!(pl.tick(&h.policy).await, TickOutcome::MetricsUnavailable);
        assert!(h.store.list_events(h.policy.id).unwrap().is_empty());

        // The next tick proceeds normally.
        assert!(matches!(pl.tick(&h.policy).await, TickOutcome::Scaled(_)));
        let snap = stats.snapshot(h.policy.id);
        assert_eq!((snap.ticks, snap.metric_failures, snap.scale_ups), (2, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_holds_then_releases() {
        let h = harness(vec![Ok((90.0, 50.0)), Ok((90.0, 50.0)), Ok((90.0, 50.0))], 1, false);
        let mut pl = h.policy_loop();

        assert!(matches!(pl.tick(&h.policy).await, TickOutcome::Scaled(_)));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(pl.tick(&h.policy).await, TickOutcome::Held);

        tokio::time::advance(Duration::from_secs(35)).await;
        let TickOutcome::Scaled(event) = pl.tick(&h.policy).await else {
            panic!("cooldown should have elapsed");
        };
        assert_eq!((event.replicas_before, event.replicas_after), (2, 3));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_scale_does_not_start_cooldown() {
        let h = harness(vec![Ok((90.0, 50.0)), Ok((90.0, 50.0))], 1, true);
        let mut pl = h.policy_loop();

        assert_eq!(pl.tick(&h.policy).await, TickOutcome::ScaleFailed);
        // Retried on the very next tick: no cooldown was armed.
        assert_eq!(pl.tick(&h.policy).await, TickOutcome::ScaleFailed);
        assert_eq!(*h.replicas.calls.lock().unwrap(), 2);
        assert!(h.store.list_events(h.policy.id).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_ticks_on_policy_interval() {
        let h = harness(vec![Ok((50.0, 50.0)), Ok((50.0, 50.0)), Ok((90.0, 50.0))], 1, false);
        let scaler = h.autoscaler();
        assert!(scaler.start_loop(&h.policy).await);
        assert!(!scaler.start_loop(&h.policy).await);

        // Interval is 10s; three ticks land at 10, 20, 30.
        tokio::time::sleep(Duration::from_secs(31)).await;

        let stats = scaler.stats(h.policy.id).await.unwrap();
        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.scale_ups, 1);
        assert_eq!(h.store.list_events(h.policy.id).unwrap().len(), 1);

        assert!(scaler.stop_loop(h.policy.id).await);
        assert!(!scaler.is_running(h.policy.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_exits_when_policy_deactivated_in_store() {
        let h = harness(vec![], 1, false);
        let scaler = h.autoscaler();
        scaler.start_loop(&h.policy).await;

        let mut inactive = h.policy.clone();
        inactive.is_active = false;
        h.store.put_policy(&inactive).unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!scaler.is_running(h.policy.id).await);
        assert!(scaler.running_loops().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_follows_active_set() {
        let h = harness(vec![], 1, false);
        let scaler = h.autoscaler();

        scaler.reconcile().await.unwrap();
        assert_eq!(scaler.running_loops().await, vec![h.policy.id]);

        h.store.delete_policy(h.policy.id).unwrap();
        scaler.reconcile().await.unwrap();
        assert!(scaler.running_loops().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_clock_outlives_the_loop() {
        let h = harness(vec![Ok((90.0, 50.0)), Ok((90.0, 50.0))], 1, false);
        let scaler = h.autoscaler();

        scaler.start_loop(&h.policy).await;
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(scaler.stop_loop(h.policy.id).await);
        assert_eq!(h.store.list_events(h.policy.id).unwrap().len(), 1);

        // A fresh loop still sees the scale from 11s ago.
        scaler.start_loop(&h.policy).await;
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(h.store.list_events(h.policy.id).unwrap().len(), 1);
        let stats = scaler.stats(h.policy.id).await.unwrap();
        assert_eq!((stats.ticks, stats.scale_ups), (2, 1));
        scaler.stop_loop(h.policy.id).await;

        // Forgetting the policy drops the clock with the counters.
        scaler.forget(h.policy.id).await;
        assert!(scaler.clocks.read().await.get(&h.policy.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn start_loop_refuses_a_stale_active_copy() {
        let h = harness(vec![], 1, false);
        let scaler = h.autoscaler();

        // Deactivated in the store after the caller read it.
        let mut inactive = h.policy.clone();
        inactive.is_active = false;
        h.store.put_policy(&inactive).unwrap();

        assert!(!scaler.start_loop(&h.policy).await);
        assert!(scaler.running_loops().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_stop_spares_a_reactivated_policy() {
        let h = harness(vec![], 1, false);
        let scaler = h.autoscaler();
        scaler.start_loop(&h.policy).await;

        // Still active in the store: a reconcile snapshot that missed the
        // activation must not stop it.
        assert!(!scaler.stop_if_inactive(h.policy.id).await);
        assert!(scaler.is_running(h.policy.id).await);

        let mut inactive = h.policy.clone();
        inactive.is_active = false;
        h.store.put_policy(&inactive).unwrap();
        assert!(scaler.stop_if_inactive(h.policy.id).await);
        assert!(!scaler.is_running(h.policy.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_reconcile_interval_is_floored() {
        let h = harness(vec![], 1, false);
        let scaler = Arc::new(h.autoscaler());
        let (tx, rx) = watch::channel(false);

        let runner = {
            let scaler = scaler.clone();
            tokio::spawn(async move { scaler.run(Duration::ZERO, rx).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scaler.is_running(h.policy.id).await);

        tx.send(true).unwrap();
        runner.await.unwrap();
        assert!(scaler.running_loops().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_loops_on_shutdown() {
        let h = harness(vec![], 1, false);
        let scaler = Arc::new(h.autoscaler());
        let (tx, rx) = watch::channel(false);

        let runner = {
            let scaler = scaler.clone();
            tokio::spawn(async move { scaler.run(Duration::from_secs(5), rx).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scaler.is_running(h.policy.id).await);

        tx.send(true).unwrap();
        runner.await.unwrap();
        assert!(scaler.running_loops().await.is_empty());
    }
}
