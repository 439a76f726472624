use shared::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Runs a store/source call under a deadline, mapping elapsed to `Error::Timeout`.
pub(crate) async fn bounded<T, F>(what: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation = what, limit_ms = limit.as_millis() as u64, "call timed out");
            Err(Error::Timeout(what.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_maps_elapsed_to_timeout() {
        let result: Result<()> = bounded("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(op)) if op == "slow"));

        let ok = bounded("fast", Duration::from_millis(200), async { Ok(5) }).await;
        assert_eq!(ok.unwrap(), 5);
    }
}
