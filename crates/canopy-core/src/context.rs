//! Per-call context: request id, cancellation and deadline

use crate::error::{RegistryError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Context inherited by every suspension point of one call
#[derive(Clone, Debug)]
pub struct CallContext {
    request_id: Uuid,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    /// Fresh context with no deadline
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Use the request id assigned by the caller, such as an HTTP layer
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// Bind the context to an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Context for a nested call, cancelled together with this one
    pub fn child(&self) -> Self {
        Self {
            request_id: self.request_id,
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` unless the call is cancelled or its deadline passes first.
    ///
    /// Cancellation wins over a ready future, so no further I/O happens once
    /// the call is cancelled.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RegistryError::Cancelled),
            _ = deadline => Err(RegistryError::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = CallContext::new();
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_future() {
        let ctx = CallContext::new();
        let handle = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.run(std::future::pending::<()>()).await })
        };

        ctx.cancel();

        assert!(matches!(handle.await.unwrap(), Err(RegistryError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_unblocks_pending_future() {
        let ctx = CallContext::new().with_timeout(Duration::from_secs(5));

        let result = ctx.run(std::future::pending::<()>()).await;

        assert!(matches!(result, Err(RegistryError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_child_follows_parent() {
        let parent = CallContext::new();
        let child = parent.child();

        parent.cancel();

        assert!(child.is_cancelled());
        assert_eq!(child.request_id(), parent.request_id());
    }
}
