//! loadscale-autoscale — threshold-driven replica scaling.
//!
//! Each active policy gets its own control loop. A tick polls the
//! workload's CPU and memory, asks the decision engine for a verdict, and
//! applies at most one replica change:
//!
//! ```text
//! cooldown active                      → no change
//! cpu > cpu_up  OR  mem > mem_up       → +1 replica (if below max)
//! cpu < cpu_down AND mem < mem_down    → -1 replica (if above min)
//! otherwise                            → no change
//! ```
//!
//! The gap between the up and down thresholds is the hysteresis band;
//! the cooldown window after each successful action keeps the loop from
//! reacting to its own change before the metrics settle.
//!
//! Metrics and replica changes come from the [`MetricsSource`] and
//! [`ReplicaManager`] traits. [`SimulatedCluster`] implements both.

pub mod controller;
pub mod decision;
pub mod error;
pub mod policy;
pub mod runtime;
pub mod service;
pub mod sim;
pub mod stats;

pub use controller::{Autoscaler, PolicyLoop, ScaleClock, TickOutcome};
pub use decision::{Decision, decide};
pub use error::{AutoscaleError, AutoscaleResult};
pub use policy::{PolicyUpdate, validate_policy, validate_spec};
pub use runtime::{BoxFuture, MetricsSource, ReplicaManager};
pub use service::ScalingService;
pub use sim::SimulatedCluster;
pub use stats::{LoopStats, LoopStatsSnapshot, render_prometheus};
