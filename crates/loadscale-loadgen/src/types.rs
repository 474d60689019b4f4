//! Load test requests, run status, and progress views.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use loadscale_core::config::LoadTestConfig;
use loadscale_core::duration::serde_str;

use crate::error::{LoadTestError, LoadTestResult};
use crate::stats::LoadTestSummary;

/// Opaque load test run identifier.
pub type RunId = uuid::Uuid;

/// What to send, how much, and over how long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestSpec {
    /// Absolute `http://` URL hit with GET requests.
    pub target: String,
    pub total_requests: u32,
    /// Upper bound on requests in flight at any instant.
    pub concurrency: u32,
    /// Dispatch window. Requests are spread evenly across it.
    #[serde(with = "serde_str")]
    pub duration: Duration,
}

impl LoadTestSpec {
    pub fn new(target: impl Into<String>, total_requests: u32, concurrency: u32, duration: Duration) -> Self {
        Self {
            target: target.into(),
            total_requests,
            concurrency,
            duration,
        }
    }

    /// Check the request against the configured ceilings.
    pub fn validate(&self, limits: &LoadTestConfig) -> LoadTestResult<()> {
        parse_target(&self.target)?;

        if self.total_requests == 0 || self.total_requests > limits.max_total_requests {
            return Err(LoadTestError::Validation(format!(
                "total requests must be between 1 and {}, got {}",
                limits.max_total_requests, self.total_requests
            )));
        }
        if self.concurrency == 0 || self.concurrency > limits.max_concurrency {
            return Err(LoadTestError::Validation(format!(
                "concurrency must be between 1 and {}, got {}",
                limits.max_concurrency, self.concurrency
            )));
        }
        if self.duration < Duration::from_secs(1) || self.duration > limits.max_duration {
            return Err(LoadTestError::Validation(format!(
                "duration must be between 1s and {}s, got {:?}",
                limits.max_duration.as_secs(),
                self.duration
            )));
        }
        Ok(())
    }
}

/// Parse and check a load test target URL.
pub fn parse_target(target: &str) -> LoadTestResult<http::Uri> {
    let uri: http::Uri = target
        .parse()
        .map_err(|e| LoadTestError::Validation(format!("malformed target {target:?}: {e}")))?;
    if uri.scheme_str() != Some("http") {
        return Err(LoadTestError::Validation(format!(
            "target {target:?} must use the http scheme"
        )));
    }
    if uri.authority().is_none() {
        return Err(LoadTestError::Validation(format!(
            "target {target:?} has no host"
        )));
    }
    Ok(uri)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time view of a run, as returned by listings.
#[derive(Debug, Clone, Serialize)]
pub struct LoadTestRun {
    pub id: RunId,
    pub spec: LoadTestSpec,
    pub status: RunStatus,
    pub summary: Option<LoadTestSummary>,
    pub failure: Option<String>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
}

/// Live progress of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub id: RunId,
    pub status: RunStatus,
    /// Requests that have finished, whatever their outcome. Never decreases.
    pub completed: u64,
    pub total: u32,
    pub in_flight: u64,
    pub elapsed: Duration,
    /// Time left in the dispatch window; zero once the run is terminal.
    pub remaining: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LoadTestConfig {
        LoadTestConfig::default()
    }

    #[test]
    fn accepts_reasonable_spec() {
        LoadTestSpec::new("http://127.0.0.1:8080/health", 100, 5, Duration::from_secs(10))
            .validate(&limits())
            .unwrap();
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let base = LoadTestSpec::new("http://localhost/", 10, 2, Duration::from_secs(5));

        let mut s = base.clone();
        s.total_requests = 0;
        assert!(matches!(s.validate(&limits()), Err(LoadTestError::Validation(m)) if m.contains("total requests")));

        let mut s = base.clone();
        s.total_requests = 10_001;
        assert!(s.validate(&limits()).is_err());

        let mut s = base.clone();
        s.concurrency = 101;
        assert!(matches!(s.validate(&limits()), Err(LoadTestError::Validation(m)) if m.contains("concurrency")));

        let mut s = base.clone();
        s.duration = Duration::from_millis(200);
        assert!(matches!(s.validate(&limits()), Err(LoadTestError::Validation(m)) if m.contains("duration")));

        let mut s = base;
        s.duration = Duration::from_secs(301);
        assert!(s.validate(&limits()).is_err());
    }

    #[test]
    fn rejects_malformed_targets() {
        for target in ["not a url", "https://example.com/", "/relative/path", "ftp://host/"] {
            assert!(
                matches!(parse_target(target), Err(LoadTestError::Validation(_))),
                "{target} should be rejected"
            );
        }
        let uri = parse_target("http://example.com:9000/ping").unwrap();
        assert_eq!(uri.port_u16(), Some(9000));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert_eq!(RunStatus::Failed.to_string(), "failed");
    }
}
