// src/metrics/collector.rs
use crate::health::{Aggregation, CheckClass};
use anyhow::Result;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        Self::with_registry(Registry::new())
    }

    /// Registers the health gauges into an existing prometheus registry, for
    /// applications that already expose one.
    pub fn with_registry(registry: Registry) -> Result<Self> {
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // 1 for a passing check, 0 for a failing one, labelled by class and name
    pub check_status: GaugeVec,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let check_status = GaugeVec::new(
            Opts::new(
                "healthcheck",
                "Indicates if check is healthy (1 is healthy, 0 is unhealthy)",
            ),
            &["check", "name"],
        )?;
        registry.register(Box::new(check_status.clone()))?;

        Ok(Self { check_status })
    }

    pub fn update_check_status(&self, class: CheckClass, name: &str, healthy: bool) {
        let value = if healthy { 1.0 } else { 0.0 };
        self.check_status
            .with_label_values(&[class.as_str(), name])
            .set(value);
    }

    pub fn record_aggregation(&self, class: CheckClass, aggregation: &Aggregation) {
        for name in aggregation.statuses().keys() {
            self.update_check_status(class, name, aggregation.passed(name));
        }
    }
}
