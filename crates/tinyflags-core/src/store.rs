use crate::error::StoreError;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// A uniform byte-level key/value store. `Read` must never surface "key not
/// found" as an error, only transport or system failures. `Write(None)` means
/// delete. `Close` must be idempotent.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn read(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// `value == None` deletes the key.
    async fn write(
        &self,
        key: &str,
        value: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

/// Returns [`StoreError::Cancelled`] if `cancel` has already fired. Stores
/// whose operations never suspend on I/O (e.g. [`crate::ConstantStore`])
/// check this once up front instead of racing a future.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

/// Races `fut` against `cancel`, returning [`StoreError::Cancelled`] if the
/// token fires first. Stores that suspend on I/O (Postgres, Redis) use this
/// to honor the caller's cancellation token on every suspension point.
pub async fn run_cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_cancelled_passes_through_when_live() {
        let cancel = CancellationToken::new();
        assert!(check_cancelled(&cancel).is_ok());
    }

    #[test]
    fn check_cancelled_errors_once_fired() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(check_cancelled(&cancel), Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn run_cancellable_returns_the_future_when_live() {
        let cancel = CancellationToken::new();
        let result = run_cancellable(&cancel, async { Ok::<_, StoreError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn run_cancellable_short_circuits_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        // `biased` ensures this wins even though the pending future never
        // resolves on its own.
        let result = run_cancellable(&cancel, std::future::pending::<Result<(), StoreError>>()).await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }
}
