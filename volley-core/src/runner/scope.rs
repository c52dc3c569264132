use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`Scope`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("canceled")]
    Canceled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// A node in the cancellation tree: run root, phase, worker group, request.
///
/// Cancelling a scope cancels every descendant. A child never outlives its parent's
/// deadline.
#[derive(Debug, Clone)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
    reason: Arc<OnceLock<ScopeError>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::root()
    }
}

impl Scope {
    /// A scope without a deadline that only stops when cancelled.
    pub fn root() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            reason: Arc::new(OnceLock::new()),
        }
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// Child whose deadline is `now + timeout`, or the parent's if that comes first.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, own) {
            (Some(parent), Some(own)) => Some(parent.min(own)),
            (Some(parent), None) => Some(parent),
            (None, own) => own,
        };

        Self {
            token: self.token.child_token(),
            deadline,
            reason: Arc::new(OnceLock::new()),
        }
    }

    pub fn cancel(&self) {
        if self.expired() {
            let _ = self.reason.set(ScopeError::DeadlineExceeded);
        } else {
            let _ = self.reason.set(ScopeError::Canceled);
        }
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline; `None` when the scope has no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// `None` while the scope is live; afterwards the first reason observed, forever.
    pub fn err(&self) -> Option<ScopeError> {
        if let Some(reason) = self.reason.get() {
            return Some(*reason);
        }

        let observed = if self.expired() {
            ScopeError::DeadlineExceeded
        } else if self.token.is_cancelled() {
            ScopeError::Canceled
        } else {
            return None;
        };

        Some(*self.reason.get_or_init(|| observed))
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    pub async fn done(&self) -> ScopeError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }

        self.err().unwrap_or(ScopeError::Canceled)
    }

    /// Runs `fut` until it completes or the scope stops, whichever comes first.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ScopeError>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn live_scope_has_no_error() {
        let scope = Scope::root();
        assert_eq!(scope.err(), None);
        assert_eq!(scope.remaining(), None);
    }

    #[tokio::test]
    async fn cancel_propagates_to_descendants() {
        let root = Scope::root();
        let phase = root.with_timeout(Duration::from_secs(60));
        let group = phase.child();

        root.cancel();

        assert_eq!(group.done().await, ScopeError::Canceled);
        assert_eq!(phase.err(), Some(ScopeError::Canceled));
        assert_eq!(root.err(), Some(ScopeError::Canceled));
    }

    #[tokio::test]
    async fn cancelling_a_child_leaves_the_parent_alone() {
        let root = Scope::root();
        let child = root.child();
        child.cancel();

        assert_eq!(child.err(), Some(ScopeError::Canceled));
        assert_eq!(root.err(), None);
    }

    #[tokio::test]
    async fn deadline_fires_as_deadline_exceeded() {
        let scope = Scope::root().with_timeout(Duration::from_millis(20));
        assert_eq!(scope.done().await, ScopeError::DeadlineExceeded);
        assert_eq!(scope.err(), Some(ScopeError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn child_inherits_earlier_parent_deadline() {
        let parent = Scope::root().with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(3600));

        assert_eq!(child.deadline(), parent.deadline());
        assert!(child.remaining().is_some_and(|r| r <= Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn first_observed_reason_is_latched() {
        let scope = Scope::root().with_timeout(Duration::from_millis(10));
        assert_eq!(scope.done().await, ScopeError::DeadlineExceeded);

        scope.cancel();
        assert_eq!(scope.err(), Some(ScopeError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn run_returns_the_future_output_when_it_wins() {
        let scope = Scope::root().with_timeout(Duration::from_secs(5));
        let out = scope.run(async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn run_is_interrupted_by_the_deadline() {
        let scope = Scope::root().with_timeout(Duration::from_millis(20));
        let out = scope
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(out, Err(ScopeError::DeadlineExceeded));
    }
}
