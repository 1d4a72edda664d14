// src/health/async_check.rs
use crate::check::{run_guarded, Check, CheckError, CheckResult};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Last known outcome of a background-evaluated check.
#[derive(Debug, Clone)]
pub struct CheckState {
    pub last_error: Option<CheckError>,
    /// `None` until the first evaluation has completed.
    pub last_updated: Option<DateTime<Utc>>,
    pub evaluations: u64,
}

impl CheckState {
    fn initial() -> Self {
        Self {
            last_error: Some(CheckError::NoData),
            last_updated: None,
            evaluations: 0,
        }
    }

    pub fn result(&self) -> CheckResult {
        match &self.last_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Reader half of an async check. Invoking it never runs the underlying
/// check: it returns whatever the background evaluator stored last.
pub struct AsyncCheck {
    name: String,
    state: Arc<ArcSwap<CheckState>>,
}

impl AsyncCheck {
    /// Starts evaluating `check` now and then once per `period`, until
    /// `shutdown` flips to `true` or its sender is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero or if called outside a tokio runtime.
    pub fn spawn(
        name: impl Into<String>,
        check: Arc<dyn Check>,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let name = name.into();
        assert!(
            !period.is_zero(),
            "async check {} needs a non-zero interval",
            name
        );
        let state = Arc::new(ArcSwap::from_pointee(CheckState::initial()));

        let evaluator = Evaluator {
            name: name.clone(),
            check,
            state: state.clone(),
        };
        tokio::spawn(evaluator.run(period, shutdown));

        Self { name, state }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> Arc<CheckState> {
        self.state.load_full()
    }
}

#[async_trait]
impl Check for AsyncCheck {
    async fn check(&self) -> CheckResult {
        self.state.load().result()
    }
}

struct Evaluator {
    name: String,
    check: Arc<dyn Check>,
    state: Arc<ArcSwap<CheckState>>,
}

impl Evaluator {
    async fn run(self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Starting async check {} with interval: {:?}", self.name, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evaluate().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Async check {} shutting down", self.name);
                        break;
                    }
                }
            }
        }
    }

    async fn evaluate(&self) {
        let result = run_guarded(self.check.as_ref()).await;
        let previous = self.state.load();
        let was_healthy = previous.last_error.is_none();
        let is_first = previous.last_updated.is_none();

        match &result {
            Ok(()) if is_first || !was_healthy => {
                info!("Async check {} is now passing", self.name);
            }
            Err(err) if is_first || was_healthy => {
                warn!("Async check {} is now failing: {}", self.name, err);
            }
            Ok(()) => debug!("Async check {} passed", self.name),
            Err(err) => debug!("Async check {} failed: {}", self.name, err),
        }

        self.state.store(Arc::new(CheckState {
            last_error: result.err(),
            last_updated: Some(Utc::now()),
            evaluations: previous.evaluations + 1,
        }));
    }
}
