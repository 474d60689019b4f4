//! Time-distributed request dispatch.
//!
//! Request `k` (0-based) of `N` becomes due `k * duration / N` after the
//! start, so at elapsed `t` the due count is
//! `min(N, floor(t * N / duration) + 1)`. A due request waits for one of
//! `concurrency` permits; nothing is dispatched at or after the deadline.
//! Requests already in flight at the deadline run to completion and are
//! folded into the aggregate in completion order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::HttpClient;
use crate::stats::{LoadTestSummary, OutcomeAccumulator, RequestOutcome};
use crate::types::LoadTestSpec;

/// Live counters of one run, shared with progress readers.
#[derive(Debug, Default)]
pub struct RunTracker {
    completed: AtomicU64,
    in_flight: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl RunTracker {
    fn begin(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn end(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous requests seen so far.
    pub fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunExit {
    Finished(LoadTestSummary),
    Cancelled,
}

#[derive(Clone)]
pub struct LoadGenerator {
    client: Arc<dyn HttpClient>,
}

impl LoadGenerator {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// Run to completion. `spec` must already be validated.
    pub async fn run(&self, spec: &LoadTestSpec) -> LoadTestSummary {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        match self.run_with(spec, Arc::new(RunTracker::default()), cancel_rx).await {
            RunExit::Finished(summary) => summary,
            // The sender lives until this function returns.
            RunExit::Cancelled => OutcomeAccumulator::default().finish(spec.total_requests, Duration::ZERO),
        }
    }

    /// Run until finished or until `true` is sent on `cancel`, which
    /// aborts in-flight requests.
    pub async fn run_with(
        &self,
        spec: &LoadTestSpec,
        tracker: Arc<RunTracker>,
        mut cancel: watch::Receiver<bool>,
    ) -> RunExit {
        let total = spec.total_requests as u64;
        let permits = Arc::new(Semaphore::new(spec.concurrency.max(1) as usize));
        let mut tasks: JoinSet<RequestOutcome> = JoinSet::new();
        let mut acc = OutcomeAccumulator::default();

        info!(
            url = %spec.target,
            total_requests = total,
            concurrency = spec.concurrency,
            duration_secs = spec.duration.as_secs_f64(),
            "load test started"
        );

        let start = Instant::now();
        let deadline = start + spec.duration;
        let mut issued = 0u64;

        // Dispatch phase.
        while issued < total {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            if issued < due_count(now - start, spec.duration, total) {
                tokio::select! {
                    biased;
                    Ok(()) = cancel.changed() => {
                        if *cancel.borrow() {
                            return cancelled(&mut tasks, issued).await;
                        }
                    }
                    Some(joined) = tasks.join_next() => fold(&mut acc, joined),
                    _ = tokio::time::sleep_until(deadline) => break,
                    Ok(permit) = permits.clone().acquire_owned() => {
                        let client = self.client.clone();
                        let target = spec.target.clone();
                        let tracker = tracker.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            tracker.begin();
                            let sent = Instant::now();
                            let result = client.get(&target).await;
                            let outcome = RequestOutcome::classify(&result, sent.elapsed());
                            tracker.end();
                            outcome
                        });
                        issued += 1;
                    }
                }
            } else {
                let next_slot = start + slot_offset(issued, spec.duration, total);
                tokio::select! {
                    biased;
                    Ok(()) = cancel.changed() => {
                        if *cancel.borrow() {
                            return cancelled(&mut tasks, issued).await;
                        }
                    }
                    Some(joined) = tasks.join_next() => fold(&mut acc, joined),
                    _ = tokio::time::sleep_until(next_slot) => {}
                }
            }
        }

        debug!(issued, in_flight = tasks.len(), "dispatch window closed, draining");

        // Drain phase.
        loop {
            tokio::select! {
                biased;
                Ok(()) = cancel.changed() => {
                    if *cancel.borrow() {
                        return cancelled(&mut tasks, issued).await;
                    }
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => fold(&mut acc, joined),
                    None => break,
                },
            }
        }

        let summary = acc.finish(spec.total_requests, start.elapsed());
        info!(
            url = %spec.target,
            dispatched = summary.dispatched,
            successful = summary.successful,
            errors = summary.errors(),
            rps = summary.requests_per_second,
            wall_clock_secs = summary.wall_clock_secs,
            "load test finished"
        );
        RunExit::Finished(summary)
    }
}

/// Number of requests due after `elapsed`.
pub fn due_count(elapsed: Duration, duration: Duration, total: u64) -> u64 {
    let d = duration.as_nanos().max(1);
    let due = elapsed.as_nanos() * total as u128 / d + 1;
    (due.min(total as u128)) as u64
}

/// Offset of request `k`'s slot, rounded up so that the request is due
/// once the slot is reached.
fn slot_offset(k: u64, duration: Duration, total: u64) -> Duration {
    let num = duration.as_nanos() * k as u128;
    let den = total.max(1) as u128;
    Duration::from_nanos(num.div_ceil(den) as u64)
}

fn fold(acc: &mut OutcomeAccumulator, joined: Result<RequestOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => acc.record(outcome),
        Err(e) => warn!(error = %e, "load request task failed"),
    }
}

async fn cancelled(tasks: &mut JoinSet<RequestOutcome>, issued: u64) -> RunExit {
    info!(issued, aborted = tasks.len(), "load test cancelled");
    tasks.shutdown().await;
    RunExit::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::{BoxFuture, DispatchError};

    /// Answers after a fixed delay with a fixed result.
    struct FixedClient {
        delay: Duration,
        result: Result<u16, DispatchError>,
        calls: AtomicU64,
    }

    impl FixedClient {
        fn new(delay: Duration, result: Result<u16, DispatchError>) -> Arc<Self> {
            Arc::new(Self {
                delay,
                result,
                calls: AtomicU64::new(0),
            })
        }
    }

    impl HttpClient for FixedClient {
        fn get<'a>(&'a self, _target: &'a str) -> BoxFuture<'a, Result<u16, DispatchError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.result.clone()
            })
        }
    }

    fn spec(total: u32, concurrency: u32, secs: u64) -> LoadTestSpec {
        LoadTestSpec::new("http://test.invalid/", total, concurrency, Duration::from_secs(secs))
    }

    #[test]
    fn due_count_spreads_requests() {
        let d = Duration::from_secs(10);
        assert_eq!(due_count(Duration::ZERO, d, 100), 1);
        assert_eq!(due_count(Duration::from_millis(99), d, 100), 1);
        assert_eq!(due_count(Duration::from_millis(100), d, 100), 2);
        assert_eq!(due_count(Duration::from_millis(9_900), d, 100), 100);
        assert_eq!(due_count(Duration::from_secs(60), d, 100), 100);
    }

    #[test]
    fn slots_line_up_with_due_count() {
        let d = Duration::from_secs(7);
        for k in 0..13 {
            let slot = slot_offset(k, d, 13);
            assert!(due_count(slot, d, 13) > k, "request {k} not due at its slot");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_never_exceeds_concurrency() {
        let client = FixedClient::new(Duration::from_secs(1), Ok(200));
        let generator = LoadGenerator::new(client.clone());
        let tracker = Arc::new(RunTracker::default());
        let (_tx, rx) = watch::channel(false);

        let start = Instant::now();
        let exit = generator.run_with(&spec(100, 5, 10), tracker.clone(), rx).await;
        let RunExit::Finished(summary) = exit else {
            panic!("run was not expected to be cancelled");
        };

        assert_eq!(tracker.peak_in_flight(), 5);
        assert_eq!(tracker.in_flight(), 0);
        // Permits gate dispatch: roughly five per second of window.
        assert!(summary.dispatched < 100);
        assert_eq!(summary.dispatched, client.calls.load(Ordering::SeqCst));
        assert_eq!(summary.successful + summary.errors(), summary.dispatched);
        // Done within the window plus one request latency.
        assert!(start.elapsed() <= Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_target_receives_every_request() {
        let client = FixedClient::new(Duration::from_millis(20), Ok(200));
        let generator = LoadGenerator::new(client);
        let tracker = Arc::new(RunTracker::default());
        let (_tx, rx) = watch::channel(false);

        let RunExit::Finished(summary) = generator.run_with(&spec(100, 5, 10), tracker.clone(), rx).await else {
            panic!("run was not expected to be cancelled");
        };

        assert_eq!(summary.dispatched, 100);
        assert_eq!(summary.successful, 100);
        assert_eq!(summary.success_rate, 1.0);
        assert_eq!(tracker.completed(), 100);
        assert!(tracker.peak_in_flight() <= 5);
        // Last slot at 9.9s plus one 20ms request.
        assert!(summary.wall_clock_secs >= 9.9 && summary.wall_clock_secs < 10.1);
    }

    #[tokio::test(start_paused = true)]
    async fn timing_out_target() {
        let client = FixedClient::new(Duration::from_millis(100), Err(DispatchError::Timeout));
        let summary = LoadGenerator::new(client).run(&spec(50, 10, 5)).await;

        assert_eq!(summary.successful, 0);
        assert_eq!(summary.timeouts, 50);
        assert_eq!(summary.dispatched, 50);
        assert!(
            (summary.requests_per_second - 10.0).abs() < 0.5,
            "rps was {}",
            summary.requests_per_second
        );
        assert_eq!(summary.successful_requests_per_second, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_are_counted_not_raised() {
        let client = FixedClient::new(Duration::from_millis(10), Ok(500));
        let summary = LoadGenerator::new(client).run(&spec(10, 2, 1)).await;
        assert_eq!(summary.server_errors, 10);
        assert_eq!(summary.successful + summary.errors(), summary.dispatched);
        assert!(summary.dispatched <= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_run() {
        let client = FixedClient::new(Duration::from_millis(50), Ok(200));
        let generator = LoadGenerator::new(client.clone());
        let tracker = Arc::new(RunTracker::default());
        let (tx, rx) = watch::channel(false);

        let run_spec = spec(100, 5, 10);
        let handle = {
            let tracker = tracker.clone();
            tokio::spawn(async move { generator.run_with(&run_spec, tracker, rx).await })
        };

        tokio::time::sleep(Duration::from_secs(2)).await;
        tx.send(true).unwrap();
        let exit = handle.await.unwrap();

        assert_eq!(exit, RunExit::Cancelled);
        let calls = client.calls.load(Ordering::SeqCst);
        assert!(calls > 0 && calls < 100, "calls was {calls}");
    }
}
