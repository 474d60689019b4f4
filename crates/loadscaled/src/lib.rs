//! loadscaled — the loadscale daemon.
//!
//! Assembles the policy store, the simulated cluster, the autoscaler, and
//! the load test registry into one process.

pub mod daemon;
pub mod pressure;

pub use daemon::{Daemon, Drive};
pub use pressure::PressureBridge;
