// src/config/models.rs
use crate::check::{self, Check};
use crate::health::{CheckClass, Registry};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_live_path")]
    pub live_path: String,
    #[serde(default = "default_ready_path")]
    pub ready_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,
    pub class: CheckClass,
    #[serde(flatten)]
    pub kind: CheckKind,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Present for checks evaluated in the background.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckKind {
    Dns { host: String },
    Tcp { addr: String },
    Http { url: Url },
    TaskCount { threshold: usize },
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8086))
}

fn default_live_path() -> String {
    "/live".to_string()
}

fn default_ready_path() -> String {
    "/ready".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            live_path: default_live_path(),
            ready_path: default_ready_path(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let endpoints = &self.endpoints;
        for path in [&endpoints.live_path, &endpoints.ready_path, &self.metrics.path] {
            if !path.starts_with('/') {
                bail!("Endpoint path must start with '/': {}", path);
            }
        }
        if endpoints.live_path == endpoints.ready_path {
            bail!("Liveness and readiness paths must differ");
        }
        if self.metrics.enabled
            && (self.metrics.path == endpoints.live_path
                || self.metrics.path == endpoints.ready_path)
        {
            bail!("Metrics path collides with a health endpoint: {}", self.metrics.path);
        }

        let mut seen = HashSet::new();
        for check in &self.checks {
            check.validate()?;
            if !seen.insert((check.class, check.name.as_str())) {
                bail!("Duplicate {} check name: {}", check.class, check.name);
            }
        }

        Ok(())
    }
}

impl CheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Check name must not be empty");
        }
        if self.timeout_ms == 0 {
            bail!("Check {} must have a non-zero timeout", self.name);
        }
        if self.interval_secs == Some(0) {
            bail!("Check {} must have a non-zero interval", self.name);
        }
        Ok(())
    }

    /// Builds the configured check and adds it to `registry`.
    pub fn register(&self, registry: &Registry) {
        let check = self.build();
        match self.interval() {
            Some(every) => registry.register_async(self.class, self.name.as_str(), check, every),
            None => registry.register(self.class, self.name.as_str(), check),
        }
    }

    fn build(&self) -> Arc<dyn Check> {
        let limit = self.timeout();
        match &self.kind {
            CheckKind::Dns { host } => Arc::new(check::dns_resolve_check(host.clone(), limit)),
            CheckKind::Tcp { addr } => Arc::new(check::tcp_dial_check(addr.clone(), limit)),
            CheckKind::Http { url } => Arc::new(check::http_get_check(url.clone(), limit)),
            CheckKind::TaskCount { threshold } => {
                Arc::new(check::timeout(check::task_count_check(*threshold), limit))
            }
        }
    }
}
