//! Closed-loop tests: a load test drives a simulated workload, and the
//! autoscaler reacts to the resulting utilization.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use loadscale_core::LoadscaleConfig;
use loadscale_core::config::PolicySeed;
use loadscale_loadgen::client::BoxFuture;
use loadscale_loadgen::{DispatchError, HttpClient, LoadTestSpec, RunStatus};
use loadscale_state::{PolicySpec, ScaleDirection, ScaleReason};
use loadscaled::{Daemon, Drive};

/// Answers every request with 200 after a short delay.
struct QuickTarget;

impl HttpClient for QuickTarget {
    fn get<'a>(&'a self, _target: &'a str) -> BoxFuture<'a, Result<u16, DispatchError>> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(200)
        })
    }
}

fn seed(workload: &str, active: bool) -> PolicySeed {
    let mut spec = PolicySpec::new("web", workload);
    spec.check_interval_seconds = 5;
    spec.cooldown_seconds = 0;
    PolicySeed { spec, active }
}

#[tokio::test(start_paused = true)]
async fn driven_load_scales_up_then_back_down() {
    let mut config = LoadscaleConfig::default();
    config.policies.push(seed("web", true));
    let daemon = Arc::new(Daemon::with_client(config, Arc::new(QuickTarget)).unwrap());

    // 100 rps for 30s: one replica saturates, three settle under the
    // scale-up threshold.
    let drive = Drive {
        spec: LoadTestSpec::new("http://web.invalid/", 3000, 20, Duration::from_secs(30)),
        workload_id: "web".into(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = {
        let daemon = daemon.clone();
        tokio::spawn(async move { daemon.run(Some(drive), shutdown_rx).await })
    };

    tokio::time::sleep(Duration::from_secs(60)).await;

    let runs = daemon.registry().list().await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    let summary = daemon.registry().result(runs[0].id).await.unwrap();
    assert_eq!(summary.dispatched, 3000);
    assert_eq!(summary.successful, 3000);

    let policy = daemon.service().list_policies().unwrap().remove(0);
    let events = daemon.service().list_events(policy.id).unwrap();
    assert!(events.len() >= 2, "expected scaling activity, got {events:?}");

    let first = &events[0];
    assert_eq!(first.event_type, ScaleDirection::ScaleUp);
    assert_eq!(first.reason, ScaleReason::Cpu);
    assert_eq!((first.replicas_before, first.replicas_after), (1, 2));

    let peak = events.iter().map(|e| e.replicas_after).max().unwrap();
    assert!(peak >= 3 && peak <= policy.max_replicas);

    // Once the run ends demand drops to zero and the workload shrinks back.
    let last = events.last().unwrap();
    assert_eq!(last.event_type, ScaleDirection::ScaleDown);
    assert_eq!(last.reason, ScaleReason::LowUtilization);
    assert_eq!(daemon.cluster().replicas("web"), Some(policy.min_replicas));
    assert_eq!(daemon.cluster().demand("web"), Some(0.0));

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
    assert!(daemon.service().autoscaler().running_loops().await.is_empty());
}

#[tokio::test]
async fn seeds_are_created_once_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = LoadscaleConfig::default();
    config.state.data_dir = Some(dir.path().to_path_buf());
    config.policies.push(seed("web", false));
    config.policies.push(seed("api", false));

    for _ in 0..2 {
        let daemon = Daemon::with_client(config.clone(), Arc::new(QuickTarget)).unwrap();
        daemon.seed().await.unwrap();

        let policies = daemon.service().list_policies().unwrap();
        assert_eq!(policies.len(), 2);
        assert!(policies.iter().all(|p| !p.is_active));
        assert_eq!(daemon.cluster().replicas("api"), Some(1));
    }
}

#[tokio::test]
async fn shutdown_without_drive() {
    let daemon = Daemon::with_client(LoadscaleConfig::default(), Arc::new(QuickTarget)).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let run = daemon.run(None, shutdown_rx);
    let stop = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(run, stop);
    result.unwrap();
}
