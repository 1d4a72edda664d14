// src/check/deadline.rs
use super::{Check, CheckError, CheckResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Wraps `check` so that callers stop waiting after `duration`.
///
/// The wrapped check runs on its own tokio task. When the deadline wins the
/// race the task is detached, not cancelled: it keeps running (and holding
/// whatever it holds) until it finishes on its own, and its result is thrown
/// away. A check that never returns therefore leaks its task. Use
/// [`Timeout::abort_on_elapsed`] to cancel the task at its next `.await`
/// instead.
pub fn timeout<C: Check>(check: C, duration: Duration) -> Timeout<C> {
    Timeout {
        inner: Arc::new(check),
        duration,
        abort_on_elapsed: false,
    }
}

pub struct Timeout<C> {
    inner: Arc<C>,
    duration: Duration,
    abort_on_elapsed: bool,
}

impl<C> Timeout<C> {
    pub fn abort_on_elapsed(mut self) -> Self {
        self.abort_on_elapsed = true;
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl<C: Check> Check for Timeout<C> {
    async fn check(&self) -> CheckResult {
        let inner = self.inner.clone();
        let mut handle = tokio::spawn(async move { inner.check().await });

        match tokio::time::timeout(self.duration, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(CheckError::from_panic(join_err.into_panic()))
            }
            Ok(Err(_)) => Err(CheckError::failed("check task was cancelled")),
            Err(_) => {
                if self.abort_on_elapsed {
                    handle.abort();
                }
                debug!("Check timed out after {:?}", self.duration);
                Err(CheckError::TimedOut(self.duration))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tokio::time::sleep;

    async fn slow_success() -> CheckResult {
        sleep(Duration::from_millis(500)).await;
        Ok(())
    }

    async fn fast_failure() -> CheckResult {
        Err(CheckError::failed("boom"))
    }

    async fn panicking() -> CheckResult {
        panic!("inside timeout")
    }

    #[tokio::test]
    async fn test_timeout_elapses() {
        let check = timeout(slow_success, Duration::from_millis(50));

        let start = Instant::now();
        let result = check.check().await;
        let elapsed = start.elapsed();

        assert_eq!(result, Err(CheckError::TimedOut(Duration::from_millis(50))));
        assert_eq!(result.unwrap_err().to_string(), "timed out after 50ms");
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(400), "took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_fast_check_passes_without_delay() {
        let check = timeout(|| async { CheckResult::Ok(()) }, Duration::from_secs(5));

        let start = Instant::now();
        assert!(check.check().await.is_ok());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_fast_failure_is_forwarded() {
        let check = timeout(fast_failure, Duration::from_secs(1));
        assert_eq!(check.check().await, Err(CheckError::failed("boom")));
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let check = timeout(panicking, Duration::from_secs(1));
        assert_eq!(
            check.check().await,
            Err(CheckError::Panicked("inside timeout".to_string()))
        );
    }

    #[tokio::test]
    async fn test_abort_on_elapsed_cancels_the_task() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let check = timeout(
            move || {
                let flag = flag.clone();
                async move {
                    sleep(Duration::from_millis(150)).await;
                    flag.store(true, Ordering::SeqCst);
                    CheckResult::Ok(())
                }
            },
            Duration::from_millis(20),
        )
        .abort_on_elapsed();

        assert!(check.check().await.is_err());
        sleep(Duration::from_millis(300)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_detached_task_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let check = timeout(
            move || {
                let flag = flag.clone();
                async move {
                    sleep(Duration::from_millis(100)).await;
                    flag.store(true, Ordering::SeqCst);
                    CheckResult::Ok(())
                }
            },
            Duration::from_millis(20),
        );

        assert!(check.check().await.is_err());
        sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
