// src/health/registry.rs
use super::aggregator::{aggregate, Aggregation};
use super::async_check::AsyncCheck;
use crate::check::Check;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub(crate) type CheckMap = BTreeMap<String, Arc<dyn Check>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckClass {
    Live,
    Ready,
}

impl CheckClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckClass::Live => "live",
            CheckClass::Ready => "ready",
        }
    }
}

impl fmt::Display for CheckClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named liveness and readiness checks for one application instance.
///
/// Both maps are copy-on-write: aggregation works on a snapshot taken without
/// blocking, and registration swaps in a new map. Registering a name twice
/// replaces the earlier check.
pub struct Registry {
    live: ArcSwap<CheckMap>,
    ready: ArcSwap<CheckMap>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Registry {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            live: ArcSwap::from_pointee(CheckMap::new()),
            ready: ArcSwap::from_pointee(CheckMap::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn add_liveness_check(&self, name: impl Into<String>, check: impl Check) {
        self.register(CheckClass::Live, name, Arc::new(check));
    }

    pub fn add_readiness_check(&self, name: impl Into<String>, check: impl Check) {
        self.register(CheckClass::Ready, name, Arc::new(check));
    }

    /// Registers `check` to run in the background every `interval`; requests
    /// only read its latest result. Must be called from within a tokio runtime;
    /// panics if `interval` is zero.
    pub fn add_liveness_check_async(
        &self,
        name: impl Into<String>,
        check: impl Check,
        interval: Duration,
    ) {
        self.register_async(CheckClass::Live, name, Arc::new(check), interval);
    }

    /// Readiness counterpart of [`Registry::add_liveness_check_async`].
    pub fn add_readiness_check_async(
        &self,
        name: impl Into<String>,
        check: impl Check,
        interval: Duration,
    ) {
        self.register_async(CheckClass::Ready, name, Arc::new(check), interval);
    }

    pub fn register(&self, class: CheckClass, name: impl Into<String>, check: Arc<dyn Check>) {
        let name = name.into();
        let mut replaced = false;

        self.checks(class).rcu(|current| {
            let mut next = CheckMap::clone(current);
            replaced = next.insert(name.clone(), check.clone()).is_some();
            next
        });

        if replaced {
            info!("Replaced {} check: {}", class, name);
        } else {
            info!("Added {} check: {}", class, name);
        }
    }

    pub fn register_async(
        &self,
        class: CheckClass,
        name: impl Into<String>,
        check: Arc<dyn Check>,
        interval: Duration,
    ) {
        let name = name.into();
        if *self.shutdown_rx.borrow() {
            warn!("Registry is shut down, not starting async {} check: {}", class, name);
            return;
        }
        let reader = AsyncCheck::spawn(name.clone(), check, interval, self.shutdown_rx.clone());
        self.register(class, name, Arc::new(reader));
    }

    /// Names registered for `class`, sorted.
    pub fn check_names(&self, class: CheckClass) -> Vec<String> {
        self.checks(class).load().keys().cloned().collect()
    }

    pub async fn aggregate(&self, class: CheckClass) -> Aggregation {
        let snapshot = self.checks(class).load_full();
        debug!("Running {} {} checks", snapshot.len(), class);
        aggregate(&snapshot).await
    }

    /// Stops every background evaluator started by this registry. Cached
    /// results stay readable but no longer change. Async checks registered
    /// afterwards are dropped with a warning.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn checks(&self, class: CheckClass) -> &ArcSwap<CheckMap> {
        match class {
            CheckClass::Live => &self.live,
            CheckClass::Ready => &self.ready,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
