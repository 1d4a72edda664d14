// src/check/mod.rs
mod builtin;
mod deadline;
mod error;

pub use builtin::{dns_resolve_check, http_get_check, task_count_check, tcp_dial_check};
pub use deadline::{timeout, Timeout};
pub use error::{format_duration, CheckError};

use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

pub type CheckResult = Result<(), CheckError>;

/// A named predicate's body: one invocation, one verdict.
///
/// Any `Fn() -> impl Future<Output = CheckResult>` closure is a check, so
/// most callers never implement this trait by hand:
///
/// ```ignore
/// async fn database() -> CheckResult {
///     Err(CheckError::failed("connection refused"))
/// }
///
/// registry.add_readiness_check("db", database);
/// registry.add_liveness_check("always", || async { CheckResult::Ok(()) });
/// ```
#[async_trait]
pub trait Check: Send + Sync + 'static {
    async fn check(&self) -> CheckResult;
}

#[async_trait]
impl<F, Fut> Check for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CheckResult> + Send + 'static,
{
    async fn check(&self) -> CheckResult {
        (self)().await
    }
}

/// Runs a check, turning a panic inside it into a `CheckError::Panicked`.
pub(crate) async fn run_guarded(check: &dyn Check) -> CheckResult {
    match AssertUnwindSafe(check.check()).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(CheckError::from_panic(payload)),
    }
}
