use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use super::report::IntervalReport;
use super::scope::{Scope, ScopeError};
use super::stats::{Statistics, StatsSnapshot};
use crate::target::Target;

/// One worker group of one phase execution, ready to run.
#[derive(Debug, Clone)]
pub struct GroupRun {
    pub phase: String,
    /// 1-based position of the group within its phase.
    pub group: usize,
    pub instances: u64,
    pub duration: Duration,
    pub delay: Duration,
    pub timeout: Duration,
    pub body: Bytes,
    pub report_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupExit {
    /// Every worker returned on its own before the group scope fired.
    Finished,
    Stopped(ScopeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    Stopped(ScopeError),
    Failed,
}

/// Runs `run.instances` workers against `target` until the group deadline (or an
/// earlier deadline of `parent`) fires.
pub async fn run_worker_group<T: Target>(
    parent: &Scope,
    target: Arc<T>,
    stats: Arc<Statistics>,
    run: GroupRun,
) -> GroupExit {
    let scope = parent.with_timeout(run.duration);
    let run = Arc::new(run);

    tracing::info!(
        phase = %run.phase,
        group = run.group,
        instances = run.instances,
        duration = ?run.duration,
        delay = ?run.delay,
        "starting workers"
    );

    let mut workers = JoinSet::new();
    for worker in 1..=run.instances {
        let scope = scope.clone();
        let target = target.clone();
        let stats = stats.clone();
        let run = run.clone();
        workers.spawn(async move {
            let exit = run_worker(&scope, target.as_ref(), &stats, &run).await;
            (worker, exit)
        });
    }

    let reporter_scope = scope.child();
    let reporter = {
        let run = run.clone();
        tokio::spawn(report_loop(
            reporter_scope.clone(),
            stats.clone(),
            run.report_interval,
            move |report| report.log(&run.phase, run.group),
        ))
    };

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((worker, WorkerExit::Stopped(reason))) => {
                tracing::debug!(group = run.group, worker, %reason, "worker stopped");
            }
            Ok((worker, WorkerExit::Failed)) => {
                tracing::debug!(group = run.group, worker, "worker ended after a fatal error");
            }
            Err(err) if err.is_panic() => {
                tracing::error!(phase = %run.phase, group = run.group, error = %err, "worker panicked");
            }
            Err(err) => {
                tracing::debug!(group = run.group, error = %err, "worker task aborted");
            }
        }
    }

    reporter_scope.cancel();
    if let Err(err) = reporter.await
        && err.is_panic()
    {
        tracing::error!(phase = %run.phase, group = run.group, error = %err, "reporter panicked");
    }

    match scope.err() {
        Some(reason) => {
            tracing::info!(phase = %run.phase, group = run.group, %reason, "worker group completed");
            GroupExit::Stopped(reason)
        }
        None => {
            tracing::info!(phase = %run.phase, group = run.group, "worker group completed: workers finished");
            GroupExit::Finished
        }
    }
}

async fn run_worker<T: Target>(
    scope: &Scope,
    target: &T,
    stats: &Statistics,
    run: &GroupRun,
) -> WorkerExit {
    let mut status_codes: HashMap<u16, u64> = HashMap::new();

    let exit = loop {
        if let Err(reason) = scope.run(tokio::time::sleep(run.delay)).await {
            break WorkerExit::Stopped(reason);
        }

        let started = Instant::now();
        let outcome = scope
            .run(target.post(run.body.clone(), Some(run.timeout)))
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Err(reason) => break WorkerExit::Stopped(reason),
            Ok(Ok(res)) => {
                stats.record_request(elapsed);
                *status_codes.entry(res.status).or_insert(0) += 1;

                if res.status == 400 {
                    tracing::warn!(phase = %run.phase, body = %res.body_lossy(), "bad request");
                } else if res.status > 400 {
                    stats.record_error();
                }
            }
            Ok(Err(err)) if err.is_fatal() => {
                tracing::error!(phase = %run.phase, group = run.group, error = %err, "failed to create request");
                break WorkerExit::Failed;
            }
            Ok(Err(err)) => {
                // A failure racing the scope deadline is just the scope firing.
                if let Some(reason) = scope.err() {
                    break WorkerExit::Stopped(reason);
                }
                // No response, so nothing counts towards requests or latency.
                stats.record_error();
                tracing::debug!(phase = %run.phase, error = %err, "request failed");
            }
        }
    };

    stats.merge_status_codes(&status_codes);
    exit
}

async fn report_loop<F>(scope: Scope, stats: Arc<Statistics>, interval: Duration, mut emit: F)
where
    F: FnMut(IntervalReport),
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately and only sets the baseline.
    ticker.tick().await;
    let mut last = stats.snapshot();
    let mut last_at = Instant::now();

    while scope.run(ticker.tick()).await.is_ok() {
        let now = Instant::now();
        let current = stats.snapshot();
        if current != StatsSnapshot::default() {
            emit(IntervalReport::between(&last, &current, now.duration_since(last_at)));
        }
        last = current;
        last_at = now;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::Mutex;
    use crate::runner::testing::FakeTarget;
    use crate::target::{TargetError, TargetResponse};

    fn group(instances: u64, duration_ms: u64, delay_ms: u64) -> GroupRun {
        GroupRun {
            phase: "test".to_string(),
            group: 1,
            instances,
            duration: Duration::from_millis(duration_ms),
            delay: Duration::from_millis(delay_ms),
            timeout: Duration::from_secs(1),
            body: Bytes::from_static(b"{}"),
            report_interval: Duration::from_millis(50),
        }
    }

    fn status(code: u16) -> Result<TargetResponse, TargetError> {
        Ok(TargetResponse {
            status: code,
            body: Bytes::from_static(b"nope"),
        })
    }

    #[tokio::test]
    async fn deadline_stops_workers_without_errors() {
        let target = Arc::new(FakeTarget::responding(|_| status(200)));
        let stats = Arc::new(Statistics::new());

        let exit = run_worker_group(&Scope::root(), target.clone(), stats.clone(), group(2, 300, 20)).await;

        assert_eq!(exit, GroupExit::Stopped(ScopeError::DeadlineExceeded));
        let snap = stats.snapshot();
        assert!(snap.requests > 5, "too few requests: {snap:?}");
        assert_eq!(snap.errors, 0);
        assert_eq!(stats.status_codes().get(&200).copied(), Some(snap.requests));
        assert_eq!(target.calls(), snap.requests as usize);
    }

    #[tokio::test]
    async fn expiry_mid_request_is_not_an_error() {
        let target = Arc::new(
            FakeTarget::responding(|_| status(200)).with_latency(Duration::from_secs(5)),
        );
        let stats = Arc::new(Statistics::new());

        let exit = run_worker_group(&Scope::root(), target, stats.clone(), group(3, 100, 0)).await;

        assert_eq!(exit, GroupExit::Stopped(ScopeError::DeadlineExceeded));
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert!(stats.status_codes().is_empty());
    }

    #[tokio::test]
    async fn transport_failures_count_only_as_errors() {
        let target = Arc::new(
            FakeTarget::responding(|_| Err(TargetError::Transport("connection refused".to_string())))
                .with_latency(Duration::from_millis(40)),
        );
        let stats = Arc::new(Statistics::new());

        run_worker_group(&Scope::root(), target, stats.clone(), group(1, 300, 0)).await;

        let snap = stats.snapshot();
        assert!(snap.errors >= 3, "too few errors: {snap:?}");
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.duration_us, 0);
        assert_eq!(snap.mean_latency(), Duration::ZERO);
        assert!(stats.status_codes().is_empty());
    }

    #[tokio::test]
    async fn request_timeouts_are_errors_while_the_group_is_live() {
        let target = Arc::new(
            FakeTarget::responding(|_| status(200)).with_latency(Duration::from_millis(500)),
        );
        let stats = Arc::new(Statistics::new());
        let run = GroupRun {
            timeout: Duration::from_millis(50),
            ..group(1, 400, 0)
        };

        let exit = run_worker_group(&Scope::root(), target, stats.clone(), run).await;

        assert_eq!(exit, GroupExit::Stopped(ScopeError::DeadlineExceeded));
        let snap = stats.snapshot();
        assert!(snap.errors >= 4, "too few timeouts: {snap:?}");
        assert_eq!(snap.requests, 0);
        assert!(stats.status_codes().is_empty());
    }

    #[tokio::test]
    async fn reporter_first_tick_is_only_a_baseline() {
        let stats = Arc::new(Statistics::new());
        stats.record_request(Duration::from_millis(1));
        let reports = Arc::new(Mutex::new(Vec::new()));

        let scope = Scope::root().with_timeout(Duration::from_millis(30));
        let sink = reports.clone();
        report_loop(scope, stats, Duration::from_millis(100), move |r| {
            sink.lock().unwrap().push(r)
        })
        .await;

        assert!(reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reporter_diffs_consecutive_ticks() {
        let stats = Arc::new(Statistics::new());
        let reports = Arc::new(Mutex::new(Vec::new()));
        let scope = Scope::root();

        let reporter = {
            let sink = reports.clone();
            tokio::spawn(report_loop(
                scope.clone(),
                stats.clone(),
                Duration::from_millis(50),
                move |r| sink.lock().unwrap().push(r),
            ))
        };

        // Idle ticks report nothing.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(reports.lock().unwrap().is_empty());

        for _ in 0..5 {
            stats.record_request(Duration::from_millis(2));
        }
        stats.record_request(Duration::from_millis(2));
        stats.record_error();

        tokio::time::sleep(Duration::from_millis(120)).await;
        scope.cancel();
        reporter.await.unwrap();

        let reports = reports.lock().unwrap();
        assert!(!reports.is_empty());
        assert_eq!(reports.iter().map(|r| r.ok).sum::<u64>(), 5);
        assert_eq!(reports.iter().map(|r| r.errors).sum::<u64>(), 1);
        assert_eq!(reports[0].mean_latency, Duration::from_millis(2));
        assert!(reports[0].requests_per_sec > 0.0);
        assert!(reports[1..].iter().all(|r| r.ok == 0 && r.requests_per_sec == 0.0));
    }

    #[tokio::test]
    async fn bad_request_is_logged_but_server_errors_count() {
        let target = Arc::new(FakeTarget::cycling(vec![status(400), status(500), status(200)]));
        let stats = Arc::new(Statistics::new());

        run_worker_group(&Scope::root(), target, stats.clone(), group(1, 300, 5)).await;

        let codes = stats.status_codes();
        let n500 = codes.get(&500).copied().unwrap_or(0);
        assert!(codes.get(&400).copied().unwrap_or(0) > 0);
        assert!(n500 > 0);
        assert_eq!(stats.errors(), n500);
        assert_eq!(codes.values().sum::<u64>(), stats.requests());
    }

    #[tokio::test]
    async fn fatal_request_errors_end_the_worker_only() {
        let target = Arc::new(FakeTarget::responding(|_| {
            Err(TargetError::InvalidRequest("bad header".to_string()))
        }));
        let stats = Arc::new(Statistics::new());

        let exit = run_worker_group(&Scope::root(), target.clone(), stats.clone(), group(4, 5_000, 0)).await;

        assert_eq!(exit, GroupExit::Finished);
        assert_eq!(target.calls(), 4);
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[tokio::test]
    async fn worker_panics_are_confined() {
        let target = Arc::new(FakeTarget::responding(|_| panic!("boom")));
        let stats = Arc::new(Statistics::new());

        let exit = run_worker_group(&Scope::root(), target, stats.clone(), group(2, 5_000, 0)).await;

        assert_eq!(exit, GroupExit::Finished);
        assert_eq!(stats.requests(), 0);
    }

    #[tokio::test]
    async fn cancellation_is_reported_as_such() {
        let root = Scope::root();
        let target = Arc::new(FakeTarget::responding(|_| status(200)));
        let stats = Arc::new(Statistics::new());

        let canceller = {
            let root = root.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                root.cancel();
            })
        };

        let exit = run_worker_group(&root, target, stats, group(2, 10_000, 5)).await;
        let _ = canceller.await;

        assert_eq!(exit, GroupExit::Stopped(ScopeError::Canceled));
    }

    #[tokio::test]
    async fn zero_instances_finish_immediately() {
        let target = Arc::new(FakeTarget::responding(|_| status(200)));
        let stats = Arc::new(Statistics::new());

        let exit = run_worker_group(&Scope::root(), target.clone(), stats, group(0, 10_000, 0)).await;

        assert_eq!(exit, GroupExit::Finished);
        assert_eq!(target.calls(), 0);
    }
}
