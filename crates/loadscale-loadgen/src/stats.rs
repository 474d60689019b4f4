//! Request outcome classification and the run aggregate.

use std::time::Duration;

use serde::Serialize;

use crate::client::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Timeout,
    ConnectionError,
    /// The target answered with a 4xx or 5xx status.
    ServerError,
}

/// One finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOutcome {
    pub latency: Duration,
    pub kind: OutcomeKind,
}

impl RequestOutcome {
    pub fn classify(result: &Result<u16, DispatchError>, latency: Duration) -> Self {
        let kind = match result {
            Ok(status) if *status < 400 => OutcomeKind::Success,
            Ok(_) => OutcomeKind::ServerError,
            Err(DispatchError::Timeout) => OutcomeKind::Timeout,
            Err(DispatchError::Connection(_)) => OutcomeKind::ConnectionError,
        };
        Self { latency, kind }
    }
}

/// Final figures for a run. Latencies are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadTestSummary {
    pub total_requests: u32,
    pub dispatched: u64,
    pub successful: u64,
    pub timeouts: u64,
    pub connection_errors: u64,
    pub server_errors: u64,
    pub mean_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub wall_clock_secs: f64,
    /// Finished requests (any outcome) per second of wall clock.
    pub requests_per_second: f64,
    pub successful_requests_per_second: f64,
    /// Successful share of finished requests, 0..=1.
    pub success_rate: f64,
}

impl LoadTestSummary {
    pub fn errors(&self) -> u64 {
        self.timeouts + self.connection_errors + self.server_errors
    }
}

/// Folds outcomes in completion order.
#[derive(Debug, Default)]
pub struct OutcomeAccumulator {
    successful: u64,
    timeouts: u64,
    connection_errors: u64,
    server_errors: u64,
    /// Latency samples in microseconds.
    latencies: Vec<u64>,
}

impl OutcomeAccumulator {
    pub fn record(&mut self, outcome: RequestOutcome) {
        match outcome.kind {
            OutcomeKind::Success => self.successful += 1,
            OutcomeKind::Timeout => self.timeouts += 1,
            OutcomeKind::ConnectionError => self.connection_errors += 1,
            OutcomeKind::ServerError => self.server_errors += 1,
        }
        self.latencies.push(outcome.latency.as_micros() as u64);
    }

    pub fn completed(&self) -> u64 {
        self.latencies.len() as u64
    }

    pub fn finish(self, total_requests: u32, wall_clock: Duration) -> LoadTestSummary {
        let completed = self.completed();
        let wall = wall_clock.as_secs_f64();
        let per_second = |n: u64| if wall > 0.0 { n as f64 / wall } else { 0.0 };

        let (mean, min, max) = if self.latencies.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let sum: u64 = self.latencies.iter().sum();
            (
                sum as f64 / completed as f64 / 1000.0,
                self.latencies.iter().copied().min().unwrap_or(0) as f64 / 1000.0,
                self.latencies.iter().copied().max().unwrap_or(0) as f64 / 1000.0,
            )
        };
        let (p50, p99) = compute_percentiles(&self.latencies);

        LoadTestSummary {
            total_requests,
            dispatched: completed,
            successful: self.successful,
            timeouts: self.timeouts,
            connection_errors: self.connection_errors,
            server_errors: self.server_errors,
            mean_latency_ms: mean,
            min_latency_ms: min,
            max_latency_ms: max,
            p50_latency_ms: p50,
            p99_latency_ms: p99,
            wall_clock_secs: wall,
            requests_per_second: per_second(completed),
            successful_requests_per_second: per_second(self.successful),
            success_rate: if completed > 0 {
                self.successful as f64 / completed as f64
            } else {
                0.0
            },
        }
    }
}

/// Compute P50 and P99 latency from microsecond samples.
///
/// Returns (p50_ms, p99_ms). If empty, returns (0.0, 0.0).
fn compute_percentiles(latencies: &[u64]) -> (f64, f64) {
    if latencies.is_empty() {
        return (0.0, 0.0);
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let p50_idx = (sorted.len() as f64 * 0.50) as usize;
    let p99_idx = (sorted.len() as f64 * 0.99) as usize;

    let p50 = sorted[p50_idx.min(sorted.len() - 1)] as f64 / 1000.0;
    let p99 = sorted[p99_idx.min(sorted.len() - 1)] as f64 / 1000.0;

    (p50, p99)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn classifies_results() {
        let kind = |r: Result<u16, DispatchError>| RequestOutcome::classify(&r, ms(1)).kind;
        assert_eq!(kind(Ok(200)), OutcomeKind::Success);
        assert_eq!(kind(Ok(302)), OutcomeKind::Success);
        assert_eq!(kind(Ok(404)), OutcomeKind::ServerError);
        assert_eq!(kind(Ok(503)), OutcomeKind::ServerError);
        assert_eq!(kind(Err(DispatchError::Timeout)), OutcomeKind::Timeout);
        assert_eq!(
            kind(Err(DispatchError::Connection("refused".into()))),
            OutcomeKind::ConnectionError
        );
    }

    #[test]
    fn aggregate_counts_and_latency() {
        let mut acc = OutcomeAccumulator::default();
        acc.record(RequestOutcome { latency: ms(10), kind: OutcomeKind::Success });
        acc.record(RequestOutcome { latency: ms(30), kind: OutcomeKind::Success });
        acc.record(RequestOutcome { latency: ms(20), kind: OutcomeKind::Timeout });
        acc.record(RequestOutcome { latency: ms(40), kind: OutcomeKind::ServerError });

        let s = acc.finish(10, Duration::from_secs(2));
        assert_eq!(s.dispatched, 4);
        assert_eq!(s.successful, 2);
        assert_eq!(s.errors(), 2);
        assert_eq!(s.successful + s.errors(), s.dispatched);
        assert_eq!(s.min_latency_ms, 10.0);
        assert_eq!(s.max_latency_ms, 40.0);
        assert_eq!(s.mean_latency_ms, 25.0);
        assert_eq!(s.requests_per_second, 2.0);
        assert_eq!(s.successful_requests_per_second, 1.0);
        assert_eq!(s.success_rate, 0.5);
    }

    #[test]
    fn empty_aggregate_is_zero() {
        let s = OutcomeAccumulator::default().finish(5, Duration::ZERO);
        assert_eq!(s.dispatched, 0);
        assert_eq!(s.requests_per_second, 0.0);
        assert_eq!(s.success_rate, 0.0);
        assert_eq!(s.p99_latency_ms, 0.0);
    }

    #[test]
    fn percentiles_single_value() {
        let (p50, p99) = compute_percentiles(&[5000]);
        assert_eq!(p50, 5.0);
        assert_eq!(p99, 5.0);
    }

    #[test]
    fn percentiles_distribution() {
        // 100 samples: 1ms to 100ms.
        let latencies: Vec<u64> = (1..=100).map(|i| i * 1000).collect();
        let (p50, p99) = compute_percentiles(&latencies);

        assert!((49.0..=51.0).contains(&p50), "p50 was {p50}");
        assert!((98.0..=100.0).contains(&p99), "p99 was {p99}");
    }
}
