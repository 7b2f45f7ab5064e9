//! Concurrent fan-out with deterministic error reporting.

use futures::future::join_all;
use std::future::Future;

/// Run every future concurrently and wait for all of them to settle.
///
/// Returns the outputs in input order, or the first error in input order.
/// A failing future never cancels its siblings. An empty input succeeds.
///
/// # Errors
///
/// Returns the error of the earliest failing future.
///
/// # Example
///
/// ```
/// use futures::future::ready;
/// use launchpad_core::join::join_all_settled;
///
/// # tokio_test::block_on(async {
/// let ok = join_all_settled([ready(Ok::<_, String>(1)), ready(Ok(2))]).await;
/// assert_eq!(ok, Ok(vec![1, 2]));
///
/// let failed = join_all_settled([ready(Ok(1)), ready(Err("a")), ready(Err("b"))]).await;
/// assert_eq!(failed, Err("a"));
/// # });
/// ```
pub async fn join_all_settled<I, F, T, E>(futures: I) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    settle_all(futures).await.into_iter().collect()
}

/// Run every future concurrently and return every result in input order.
pub async fn settle_all<I, F>(futures: I) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn delayed(ms: u64, result: Result<u32, String>) -> BoxFuture<'static, Result<u32, String>> {
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            result
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_all_succeed_in_input_order() {
        let result = join_all_settled(vec![delayed(20, Ok(1)), delayed(0, Ok(2))]).await;
        assert_eq!(result, Ok(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_empty_succeeds() {
        let result = join_all_settled(Vec::<BoxFuture<'static, Result<u32, String>>>::new()).await;
        assert_eq!(result, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_first_error_in_input_order() {
        let result = join_all_settled(vec![
            delayed(0, Ok(1)),
            delayed(30, Err("slow".to_string())),
            delayed(0, Err("fast".to_string())),
        ])
        .await;
        assert_eq!(result, Err("slow".to_string()));
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let task = |ms: u64, result: Result<(), String>| {
            let finished = Arc::clone(&finished);
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                result
            }
        };

        let result = join_all_settled(vec![
            task(0, Err("boom".to_string())).boxed(),
            task(20, Ok(())).boxed(),
            task(40, Ok(())).boxed(),
        ])
        .await;

        assert!(result.is_err());
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_runs_concurrently() {
        let start = tokio::time::Instant::now();
        let result =
            join_all_settled(vec![delayed(100, Ok(1)), delayed(100, Ok(2)), delayed(100, Ok(3))])
                .await;
        assert_eq!(result, Ok(vec![1, 2, 3]));
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_settle_all_keeps_every_result() {
        let results = settle_all(vec![delayed(0, Ok(1)), delayed(0, Err("x".to_string()))]).await;
        assert_eq!(results, vec![Ok(1), Err("x".to_string())]);
    }
}
