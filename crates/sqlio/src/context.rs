//! Cancellation handle threaded through every blocking operation
//!
//! A [`Context`] is a `tokio_util` [`CancellationToken`]. Suspension points
//! wrap their future with [`cancellable`], which turns an observed
//! cancellation into [`Error::Cancelled`].

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

pub use tokio_util::sync::CancellationToken as Context;

/// Context that is never cancelled
pub fn background() -> Context {
    Context::new()
}

/// Fail fast when the context is already cancelled
#[inline]
pub fn check(ctx: &Context) -> Result<()> {
    if ctx.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Run `fut` unless `ctx` is cancelled first
pub async fn cancellable<T, F>(ctx: &Context, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(Error::Cancelled),
        res = fut => res,
    }
}

/// Sleep for `d` unless `ctx` is cancelled first
pub async fn sleep(ctx: &Context, d: Duration) -> Result<()> {
    cancellable(ctx, async {
        tokio::time::sleep(d).await;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellable_passes_result() {
        let ctx = background();
        let v = cancellable(&ctx, async { Ok(7) }).await.unwrap();
        assert_eq!(v, 7);
    }

    #[tokio::test]
    async fn test_cancellable_observes_cancel() {
        let ctx = background();
        ctx.cancel();
        let err = cancellable(&ctx, std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(check(&ctx).is_err());
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let ctx = background();
        sleep(&ctx, Duration::from_millis(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_cancel() {
        let ctx = background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let err = sleep(&ctx, Duration::from_secs(30)).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
