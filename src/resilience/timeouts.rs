//! Timeout enforcement.
//!
//! Every remote attempt has a deadline. Timeout errors are distinct from
//! other failures and carry the deadline that elapsed.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{CallError, CallResult};

/// Run `fut` with a deadline, mapping expiry to `CallError::Timeout`.
///
/// The inner future is dropped on expiry, cancelling whatever it was doing.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> CallResult<T>
where
    F: Future<Output = CallResult<T>>,
{
    match timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(CallError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let result: CallResult<()> = with_deadline(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(CallError::Timeout(Duration::from_millis(100))));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: CallResult<()> = with_deadline(Duration::from_secs(1), async {
            Err(CallError::Unreachable("refused".into()))
        })
        .await;
        assert_eq!(result, Err(CallError::Unreachable("refused".into())));
    }
}
