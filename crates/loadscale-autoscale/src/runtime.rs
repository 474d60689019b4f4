//! Container-runtime collaborators the control loop drives.
//!
//! Both are object-safe so the loop can hold `Arc<dyn …>` and tests can
//! swap in scripted implementations.

use std::future::Future;
use std::pin::Pin;

use loadscale_state::{ReplicaSnapshot, ScaleDirection};

/// Boxed, sendable future returned by collaborator methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Supplies the current resource readings of a workload.
pub trait MetricsSource: Send + Sync {
    /// Read CPU%, memory% and replica count for `workload_id`.
    fn poll<'a>(&'a self, workload_id: &'a str) -> BoxFuture<'a, anyhow::Result<ReplicaSnapshot>>;
}

/// Adds or removes replicas of a workload.
pub trait ReplicaManager: Send + Sync {
    /// Add or remove exactly one replica. Returns the replica count after
    /// the change.
    fn scale<'a>(
        &'a self,
        workload_id: &'a str,
        direction: ScaleDirection,
    ) -> BoxFuture<'a, anyhow::Result<u32>>;
}
