use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SyncError;

/// Cancellation and deadline threaded through one sync call.
///
/// Every network call and backoff sleep made by the engine races against
/// both; whichever fires first turns the call into [`SyncError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct SyncContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl SyncContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Drive `fut` to completion unless the context is cancelled or its
    /// deadline passes first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, SyncError>
    where
        F: Future<Output = T>,
    {
        if self.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(SyncError::Cancelled),
            _ = deadline => Err(SyncError::Cancelled),
            out = fut => Ok(out),
        }
    }

    pub async fn sleep(&self, d: Duration) -> Result<(), SyncError> {
        self.run(tokio::time::sleep(d)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_completes_without_cancellation() {
        let ctx = SyncContext::new();
        assert_eq!(ctx.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let ctx = SyncContext::new();
        ctx.cancel();
        let res = ctx.run(async { 7 }).await;
        assert!(matches!(res, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn deadline_interrupts_slow_future() {
        let ctx = SyncContext::new().with_timeout(Duration::from_millis(20));
        let res = ctx.sleep(Duration::from_secs(5)).await;
        assert!(matches!(res, Err(SyncError::Cancelled)));
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_during_wait() {
        let ctx = SyncContext::new();
        let token = ctx.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let res = ctx.sleep(Duration::from_secs(5)).await;
        assert!(matches!(res, Err(SyncError::Cancelled)));
    }
}
