// src/health/aggregator.rs
use super::registry::CheckMap;
use crate::check::run_guarded;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const STATUS_OK: &str = "OK";

/// Outcome of running every check of one class: `"OK"` or the failure
/// message per check name, plus the overall verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    statuses: BTreeMap<String, String>,
    failed: BTreeSet<String>,
}

impl Aggregation {
    pub fn is_healthy(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn passed(&self, name: &str) -> bool {
        self.statuses.contains_key(name) && !self.failed.contains(name)
    }

    pub fn statuses(&self) -> &BTreeMap<String, String> {
        &self.statuses
    }

    pub fn into_statuses(self) -> BTreeMap<String, String> {
        self.statuses
    }
}

impl FromIterator<(String, Result<(), String>)> for Aggregation {
    fn from_iter<I: IntoIterator<Item = (String, Result<(), String>)>>(iter: I) -> Self {
        let mut failed = BTreeSet::new();
        let statuses = iter
            .into_iter()
            .map(|(name, result)| match result {
                Ok(()) => (name, STATUS_OK.to_string()),
                Err(message) => {
                    failed.insert(name.clone());
                    (name, message)
                }
            })
            .collect();

        Self { statuses, failed }
    }
}

/// Runs all `checks` concurrently and folds their results. An empty map is
/// healthy.
pub(crate) async fn aggregate(checks: &CheckMap) -> Aggregation {
    let runs = checks.iter().map(|(name, check)| async move {
        let result = run_guarded(check.as_ref()).await.map_err(|err| {
            debug!("Check {} failed: {}", name, err);
            err.to_string()
        });
        (name.clone(), result)
    });

    futures::future::join_all(runs).await.into_iter().collect()
}
