//! loadscale-loadgen — HTTP load tests with bounded concurrency.
//!
//! # Architecture
//!
//! ```text
//! TestRegistry
//!   ├── submit() → RunId, one task per run
//!   │   └── LoadGenerator::run_with()
//!   │       ├── due_count() paces dispatch across the window
//!   │       ├── Semaphore caps requests in flight
//!   │       └── HttpClient::get() → RequestOutcome
//!   ├── progress() / result() / list() / cancel() / remove()
//!   └── run_reaper() drops finished runs after the retention window
//! ```

pub mod client;
pub mod error;
pub mod generator;
pub mod registry;
pub mod stats;
pub mod types;

pub use client::{DispatchError, HttpClient, HyperClient};
pub use error::{LoadTestError, LoadTestResult};
pub use generator::{LoadGenerator, RunExit, RunTracker, due_count};
pub use registry::TestRegistry;
pub use stats::{LoadTestSummary, OutcomeKind, RequestOutcome};
pub use types::{LoadTestRun, LoadTestSpec, Progress, RunId, RunStatus, parse_target};
