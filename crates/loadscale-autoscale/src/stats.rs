//! Per-policy loop counters and their Prometheus text exposition.
//!
//! The control loop runs unattended, so recovered failures only show up
//! here and in the logs.

use std::sync::atomic::{AtomicU64, Ordering};

use loadscale_state::{PolicyId, ScaleDirection};

/// Lock-free counters owned by one policy loop.
#[derive(Debug, Default)]
pub struct LoopStats {
    ticks: AtomicU64,
    metric_failures: AtomicU64,
    replica_failures: AtomicU64,
    scale_ups: AtomicU64,
    scale_downs: AtomicU64,
    /// Replica count from the most recent successful poll.
    replicas: AtomicU64,
}

impl LoopStats {
    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_metric_failure(&self) {
        self.metric_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replica_failure(&self) {
        self.replica_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replicas(&self, replicas: u32) {
        self.replicas.store(replicas as u64, Ordering::Relaxed);
    }

    pub fn record_scale(&self, direction: ScaleDirection, replicas_after: u32) {
        match direction {
            ScaleDirection::ScaleUp => self.scale_ups.fetch_add(1, Ordering::Relaxed),
            ScaleDirection::ScaleDown => self.scale_downs.fetch_add(1, Ordering::Relaxed),
        };
        self.record_replicas(replicas_after);
    }

    pub fn snapshot(&self, policy_id: PolicyId) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            policy_id,
            ticks: self.ticks.load(Ordering::Relaxed),
            metric_failures: self.metric_failures.load(Ordering::Relaxed),
            replica_failures: self.replica_failures.load(Ordering::Relaxed),
            scale_ups: self.scale_ups.load(Ordering::Relaxed),
            scale_downs: self.scale_downs.load(Ordering::Relaxed),
            replicas: self.replicas.load(Ordering::Relaxed) as u32,
        }
    }
}

/// Point-in-time copy of a policy's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopStatsSnapshot {
    pub policy_id: PolicyId,
    pub ticks: u64,
    pub metric_failures: u64,
    pub replica_failures: u64,
    pub scale_ups: u64,
    pub scale_downs: u64,
    pub replicas: u32,
}

/// Render loop counters into Prometheus text format with `policy` labels.
pub fn render_prometheus(snapshots: &[LoopStatsSnapshot]) -> String {
    let mut out = String::new();

    let families: [(&str, &str, &str, fn(&LoopStatsSnapshot) -> u64); 6] = [
        ("loadscale_loop_ticks_total", "counter", "Control loop ticks executed.", |s| s.ticks),
        (
            "loadscale_metric_failures_total",
            "counter",
            "Metrics polls that failed.",
            |s| s.metric_failures,
        ),
        (
            "loadscale_replica_failures_total",
            "counter",
            "Replica scale calls that failed.",
            |s| s.replica_failures,
        ),
        ("loadscale_scale_ups_total", "counter", "Executed scale-up actions.", |s| s.scale_ups),
        ("loadscale_scale_downs_total", "counter", "Executed scale-down actions.", |s| s.scale_downs),
        ("loadscale_replicas", "gauge", "Last observed replica count.", |s| s.replicas as u64),
    ];

    for (name, kind, help, value) in families {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} {kind}\n"));
        for s in snapshots {
            out.push_str(&format!("{name}{{policy=\"{}\"}} {}\n", s.policy_id, value(s)));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = LoopStats::default();
        stats.record_tick();
        stats.record_tick();
        stats.record_metric_failure();
        stats.record_replica_failure();
        stats.record_scale(ScaleDirection::ScaleUp, 3);
        stats.record_scale(ScaleDirection::ScaleDown, 2);

        let snap = stats.snapshot(4);
        assert_eq!(
            snap,
            LoopStatsSnapshot {
                policy_id: 4,
                ticks: 2,
                metric_failures: 1,
                replica_failures: 1,
                scale_ups: 1,
                scale_downs: 1,
                replicas: 2,
            }
        );
    }

    #[test]
    fn render_contains_all_families() {
        let stats = LoopStats::default();
        stats.record_tick();
        stats.record_replicas(3);
        let output = render_prometheus(&[stats.snapshot(1), LoopStats::default().snapshot(2)]);

        assert!(output.contains("# TYPE loadscale_loop_ticks_total counter"));
        assert!(output.contains("loadscale_loop_ticks_total{policy=\"1\"} 1"));
        assert!(output.contains("loadscale_loop_ticks_total{policy=\"2\"} 0"));
        assert!(output.contains("# TYPE loadscale_replicas gauge"));
        assert!(output.contains("loadscale_replicas{policy=\"1\"} 3"));
        assert!(output.contains("loadscale_scale_downs_total{policy=\"2\"} 0"));
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&[]);
        assert!(output.contains("# HELP loadscale_scale_ups_total"));
        assert!(!output.contains("{policy="));
    }
}
