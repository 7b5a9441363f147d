//! Call context carrying cancellation and deadline
//!
//! Every blocking point in a provider call (limiter wait, network round trip,
//! retry backoff) races against the caller's [`Context`].

use crate::providers::error::{ProviderError, ProviderResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus an optional absolute deadline
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled unless asked to be
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now
    ///
    /// A timeout too large to represent leaves the context without a deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Derived context: cancelled with its parent, same deadline
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derived context whose deadline is the earlier of the parent's and `timeout` from now
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(existing), Some(candidate)) => Some(existing.min(candidate)),
            (existing, candidate) => existing.or(candidate),
        };
        Self {
            token: self.token.child_token(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The error this context has already failed with, if any
    pub fn err(&self) -> Option<ProviderError> {
        if self.token.is_cancelled() {
            return Some(ProviderError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(ProviderError::Timeout("context deadline exceeded".to_string()))
            }
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ProviderError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => ProviderError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => {
                    ProviderError::Timeout("context deadline exceeded".to_string())
                }
            },
            None => {
                self.token.cancelled().await;
                ProviderError::Cancelled
            }
        }
    }

    /// Drive `fut` unless the context ends first
    pub async fn run<F, T>(&self, fut: F) -> ProviderResult<T>
    where
        F: Future<Output = ProviderResult<T>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }

    /// Cancellable sleep
    pub async fn sleep(&self, duration: Duration) -> ProviderResult<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::new();
        let value = ctx.run(async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_cancelled_before_run() {
        let ctx = Context::new();
        ctx.cancel();
        let result: ProviderResult<()> = ctx.run(async { Ok(()) }).await;
        assert!(matches!(result, Err(ProviderError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_sleep() {
        let ctx = Context::with_timeout(Duration::from_millis(50));
        let result = ctx.sleep(Duration::from_secs(10)).await;
        assert!(matches!(result, Err(ProviderError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let parent = Context::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(matches!(child.err(), Some(ProviderError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_with_timeout_keeps_earlier_deadline() {
        let parent = Context::with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(30));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn test_unrepresentable_timeout_has_no_deadline() {
        let ctx = Context::with_timeout(Duration::MAX);
        assert_eq!(ctx.deadline(), None);
        assert!(ctx.err().is_none());

        let child = Context::new().child_with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_child_timeout_keeps_parent_deadline() {
        let parent = Context::with_timeout(Duration::from_secs(5));
        let child = parent.child_with_timeout(Duration::MAX);
        assert_eq!(child.deadline(), parent.deadline());
    }
}
