use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for one phase execution, shared by every worker of the phase.
///
/// Counters are lock-free; the status-code histogram is merged under a mutex once per
/// worker, so it lags the counters while workers are still running.
#[derive(Debug, Default)]
pub struct Statistics {
    requests: AtomicU64,
    errors: AtomicU64,
    duration_us: AtomicU64,
    status_codes: Mutex<HashMap<u16, u64>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub duration_us: u64,
}

impl StatsSnapshot {
    pub fn ok(&self) -> u64 {
        self.requests.saturating_sub(self.errors)
    }

    /// Mean request latency; zero when nothing was recorded.
    pub fn mean_latency(&self) -> Duration {
        if self.requests == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.duration_us / self.requests)
    }

    /// Growth since an earlier snapshot of the same counters.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.saturating_sub(earlier.requests),
            errors: self.errors.saturating_sub(earlier.errors),
            duration_us: self.duration_us.saturating_sub(earlier.duration_us),
        }
    }
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a request that got a response, whatever its status.
    pub fn record_request(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.duration_us.fetch_add(us, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn merge_status_codes(&self, local: &HashMap<u16, u64>) {
        if local.is_empty() {
            return;
        }

        let mut guard = self
            .status_codes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (&code, &count) in local {
            *guard.entry(code).or_insert(0) += count;
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            duration_us: self.duration_us.load(Ordering::Relaxed),
        }
    }

    pub fn status_codes(&self) -> BTreeMap<u16, u64> {
        self.status_codes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(&k, &v)| (k, v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::Arc;

    #[test]
    fn mean_latency_uses_request_count() {
        let stats = Statistics::new();
        stats.record_request(Duration::from_millis(10));
        stats.record_request(Duration::from_millis(30));
        stats.record_error();

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.ok(), 1);
        assert_eq!(snap.mean_latency(), Duration::from_millis(20));
    }

    #[test]
    fn errors_without_responses_do_not_underflow_ok() {
        let stats = Statistics::new();
        stats.record_error();
        stats.record_error();

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 0);
        assert_eq!(snap.errors, 2);
        assert_eq!(snap.ok(), 0);
        assert_eq!(snap.mean_latency(), Duration::ZERO);
    }

    #[test]
    fn empty_snapshot_has_zero_latency() {
        assert_eq!(StatsSnapshot::default().mean_latency(), Duration::ZERO);
    }

    #[test]
    fn interval_delta() {
        let stats = Statistics::new();
        stats.record_request(Duration::from_micros(100));
        let first = stats.snapshot();
        stats.record_request(Duration::from_micros(300));
        stats.record_error();

        let delta = stats.snapshot().since(&first);
        assert_eq!(
            delta,
            StatsSnapshot {
                requests: 1,
                errors: 1,
                duration_us: 300
            }
        );
    }

    #[test]
    fn histograms_merge_across_threads() {
        let stats = Arc::new(Statistics::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    let mut local = HashMap::new();
                    for _ in 0..100 {
                        stats.record_request(Duration::from_micros(1));
                        *local.entry(200u16).or_insert(0) += 1;
                    }
                    local.insert(503, 2);
                    stats.merge_status_codes(&local);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.requests(), 800);
        let codes = stats.status_codes();
        assert_eq!(codes.get(&200), Some(&800));
        assert_eq!(codes.get(&503), Some(&16));
        assert_eq!(codes.keys().copied().collect::<Vec<_>>(), vec![200, 503]);
    }
}
