//! Per-operation deadline and cancellation.
//!
//! Every store operation runs under a [`Context`]. The context bounds the
//! backend call by a deadline and lets the caller abandon it through a
//! [`CancellationToken`]. A context without a deadline inherits the store's
//! default timeout.

use crate::error::{XdbError, XdbResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Deadline and cancellation for one store operation.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use xidb_core::Context;
///
/// let ctx = Context::new().with_timeout(Duration::from_millis(250));
/// assert!(ctx.deadline().is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl Context {
    /// Creates a context with no deadline and a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias of [`Context::new`] for call sites with no caller of their own.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a context that shares this deadline and is cancelled whenever
    /// this one is, but can also be cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancellation: self.cancellation.child_token(),
        }
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Uses `token` for cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the caller's deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns true once the caller has cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves the deadline to enforce: the caller's, else `default_timeout`
    /// from now. A zero default means no deadline.
    fn effective_deadline(&self, default_timeout: Duration) -> Option<Instant> {
        self.deadline.or_else(|| {
            (!default_timeout.is_zero()).then(|| Instant::now() + default_timeout)
        })
    }

    /// Runs `fut` under this context.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the token fires first and `DeadlineExceeded`
    /// if the deadline passes first; otherwise whatever `fut` returns.
    pub async fn run<T, F>(
        &self,
        operation: &'static str,
        default_timeout: Duration,
        fut: F,
    ) -> XdbResult<T>
    where
        F: Future<Output = XdbResult<T>>,
    {
        if self.cancellation.is_cancelled() {
            return Err(XdbError::Cancelled { operation });
        }

        match self.effective_deadline(default_timeout) {
            Some(deadline) => tokio::select! {
                biased;
                () = self.cancellation.cancelled() => Err(XdbError::Cancelled { operation }),
                result = tokio::time::timeout_at(deadline, fut) => match result {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(operation, "deadline exceeded");
                        Err(XdbError::DeadlineExceeded { operation })
                    }
                },
            },
            None => tokio::select! {
                biased;
                () = self.cancellation.cancelled() => Err(XdbError::Cancelled { operation }),
                result = fut => result,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn completes_within_deadline() {
        let ctx = Context::new().with_timeout(Duration::from_secs(5));
        let value = ctx
            .run("get", Duration::ZERO, async { Ok::<_, XdbError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_reports_operation() {
        let ctx = Context::new().with_timeout(Duration::from_millis(10));
        let err = ctx
            .run("list", Duration::ZERO, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, XdbError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, XdbError::DeadlineExceeded { operation: "list" }));
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_applies_without_caller_deadline() {
        let err = Context::new()
            .run("count", Duration::from_millis(5), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, XdbError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    }

    #[tokio::test]
    async fn cancelled_before_start_fails_fast() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = Context::new().with_cancellation(token);
        let err = ctx
            .run("create", Duration::ZERO, async { Ok::<_, XdbError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, XdbError::Cancelled { operation: "create" }));
        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    }

    #[tokio::test]
    async fn cancel_during_run() {
        let token = CancellationToken::new();
        let ctx = Context::new().with_cancellation(token.clone());
        let handle = tokio::spawn(async move {
            ctx.run("get", Duration::ZERO, async {
                std::future::pending::<()>().await;
                Ok::<_, XdbError>(())
            })
            .await
        });
        token.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, XdbError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn child_follows_parent_cancellation() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.child();
        assert_eq!(child.deadline(), parent.deadline());

        child.cancellation_token().cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancellation_token().cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let err = Context::new()
            .run("get", Duration::from_secs(1), async {
                Err::<(), _>(XdbError::not_found("x", "/p"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
