//! Bounded retry combinator.

use std::fmt::Display;
use std::future::Future;

use tracing::warn;

/// Run `op`, re-running it up to `retries` more times while it fails with
/// an error `should_retry` accepts.
pub async fn with_retry<T, E, F, Fut>(
    retries: usize,
    should_retry: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries && should_retry(&e) => {
                attempt += 1;
                warn!(attempt, retries, error = %e, "retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn succeeds_after_one_failure() {
        let calls = AtomicUsize::new(0);
        let result: Result<usize, String> = with_retry(1, |_| true, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 { Err("flaky".to_string()) } else { Ok(n) }
        })
        .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = with_retry(1, |_| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down".to_string())
        })
        .await;
        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = with_retry(3, |e: &String| e != "fatal", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("fatal".to_string())
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
