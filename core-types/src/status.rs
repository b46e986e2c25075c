// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

/// Coarse health level reported by each long-running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OverallStatus {
    Ok,
    #[default]
    Warn,
    Crit,
}

/// Named numeric reading published next to a service's health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusGauge {
    pub label: String,
    pub value: f64,
    pub unit: Option<String>,
}

impl StatusGauge {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
struct ServiceStatus {
    overall: OverallStatus,
    warnings: Vec<String>,
    errors: Vec<String>,
    gauges: Vec<StatusGauge>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatusSnapshot {
    pub name: String,
    pub overall: OverallStatus,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub gauges: Vec<StatusGauge>,
}

/// Cloneable handle a service uses to publish its own health.
#[derive(Clone)]
pub struct ServiceStatusHandle {
    name: &'static str,
    inner: Arc<RwLock<ServiceStatus>>,
}

impl ServiceStatusHandle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(ServiceStatus::default())),
        }
    }

    pub fn service_name(&self) -> &'static str {
        self.name
    }

    pub fn set_overall(&self, status: OverallStatus) {
        self.inner.write().overall = status;
    }

    pub fn overall(&self) -> OverallStatus {
        self.inner.read().overall
    }

    pub fn push_warning(&self, msg: impl Into<String>) {
        self.inner.write().warnings.push(msg.into());
    }

    pub fn clear_warnings(&self) {
        self.inner.write().warnings.clear();
    }

    pub fn push_error(&self, msg: impl Into<String>) {
        self.inner.write().errors.push(msg.into());
    }

    pub fn clear_errors_matching(&self, predicate: impl Fn(&str) -> bool) {
        self.inner.write().errors.retain(|e| !predicate(e));
    }

    /// Replaces the gauge with the same label, or appends it.
    pub fn set_gauge(&self, gauge: StatusGauge) {
        let mut guard = self.inner.write();
        match guard.gauges.iter_mut().find(|g| g.label == gauge.label) {
            Some(existing) => *existing = gauge,
            None => guard.gauges.push(gauge),
        }
    }

    pub fn snapshot(&self) -> ServiceStatusSnapshot {
        let guard = self.inner.read();
        ServiceStatusSnapshot {
            name: self.name.to_string(),
            overall: guard.overall,
            warnings: guard.warnings.clone(),
            errors: guard.errors.clone(),
            gauges: guard.gauges.clone(),
        }
    }
}

/// Normalises a gauge label into a metric-name fragment.
pub fn metric_slug(label: &str) -> String {
    label
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
