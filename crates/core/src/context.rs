//! Per-call cancellation and deadline.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{SlurmError, SlurmResult};

/// Carried by every blocking operation. Cloning shares the cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl CallContext {
    pub fn new() -> Self { Self::default() }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self { cancel, timeout: None }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Apply `timeout` only when the caller did not set one.
    pub fn or_timeout(mut self, timeout: Option<Duration>) -> Self {
        if self.timeout.is_none() {
            self.timeout = timeout;
        }
        self
    }

    pub fn deadline(&self) -> Option<Duration> { self.timeout }

    pub fn cancel_token(&self) -> &CancellationToken { &self.cancel }

    pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }

    /// Context for a sub-operation: cancelled with the parent, own deadline.
    pub fn child(&self) -> Self {
        Self { cancel: self.cancel.child_token(), timeout: self.timeout }
    }

    /// Drive `fut` to completion unless the context is cancelled or its deadline passes.
    pub async fn run<T, F>(&self, fut: F) -> SlurmResult<T>
    where
        F: Future<Output = SlurmResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(SlurmError::Cancelled);
        }
        match self.timeout {
            Some(limit) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(SlurmError::Cancelled),
                    res = tokio::time::timeout(limit, fut) => match res {
                        Ok(inner) => inner,
                        Err(_) => Err(SlurmError::Timeout { after_ms: limit.as_millis() as u64 }),
                    },
                }
            }
            None => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(SlurmError::Cancelled),
                    res = fut => res,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_maps_to_timeout() {
        let ctx = CallContext::new().timeout(Duration::from_millis(50));
        let res: SlurmResult<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(res, Err(SlurmError::Timeout { after_ms: 50 }));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = CallContext::with_cancel(token);
        let res = ctx.run(async { Ok(1) }).await;
        assert_eq!(res, Err(SlurmError::Cancelled));
    }

    #[tokio::test]
    async fn child_follows_parent_cancel() {
        let ctx = CallContext::new();
        let child = ctx.child();
        ctx.cancel_token().cancel();
        assert!(child.is_cancelled());
    }
}
