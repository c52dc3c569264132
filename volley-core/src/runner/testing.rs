use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;

use crate::target::{Target, TargetError, TargetResponse};

type Responder = Box<dyn Fn(&Bytes) -> Result<TargetResponse, TargetError> + Send + Sync>;

/// In-process target that answers from a closure and records every body it receives.
///
/// A latency above the request timeout yields [`TargetError::Timeout`] once the timeout
/// has passed.
pub(crate) struct FakeTarget {
    respond: Responder,
    latency: Duration,
    calls: AtomicUsize,
    bodies: Mutex<Vec<Bytes>>,
}

impl FakeTarget {
    pub(crate) fn responding<F>(respond: F) -> Self
    where
        F: Fn(&Bytes) -> Result<TargetResponse, TargetError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
        }
    }

    /// Answers with `responses` in order, starting over after the last one.
    pub(crate) fn cycling(responses: Vec<Result<TargetResponse, TargetError>>) -> Self {
        let next = AtomicUsize::new(0);
        Self::responding(move |_| {
            let i = next.fetch_add(1, Ordering::Relaxed) % responses.len();
            responses[i].clone()
        })
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub(crate) fn bodies(&self) -> Vec<Bytes> {
        self.bodies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Target for FakeTarget {
    async fn post(
        &self,
        body: Bytes,
        timeout: Option<Duration>,
    ) -> Result<TargetResponse, TargetError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.bodies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(body.clone());

        if let Some(timeout) = timeout
            && self.latency > timeout
        {
            tokio::time::sleep(timeout).await;
            return Err(TargetError::Timeout(timeout));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.respond)(&body)
    }
}
