// Copyright (c) James Kassemi, SC, US. All rights reserved.
//! Prometheus metrics, rendered on demand from live snapshots.
use std::sync::Arc;

use core_types::status::{metric_slug, OverallStatus, ServiceStatusHandle, ServiceStatusSnapshot};
use flight_registry::FlightRegistry;
use oracle_response_engine::{DispatchMetrics, DispatchMetricsSnapshot};
use parking_lot::RwLock;
use prometheus::{Encoder, GaugeVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Gauges on a private registry, set from snapshots right before encoding.
struct MetricsExporter {
    registry: Registry,
    submissions: IntGaugeVec,
    requests: IntGauge,
    requests_in_flight: IntGauge,
    flights: IntGauge,
    resyncs: IntGauge,
    service_gauges: GaugeVec,
}

impl MetricsExporter {
    fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let submissions = IntGaugeVec::new(
            Opts::new(
                "oracle_submissions_total",
                "Oracle response submissions by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(submissions.clone()))?;
        let requests = IntGauge::with_opts(Opts::new(
            "oracle_requests_total",
            "Status requests handled by the response orchestrator",
        ))?;
        registry.register(Box::new(requests.clone()))?;
        let requests_in_flight = IntGauge::with_opts(Opts::new(
            "oracle_requests_in_flight",
            "Status requests with submissions still outstanding",
        ))?;
        registry.register(Box::new(requests_in_flight.clone()))?;
        let flights = IntGauge::with_opts(Opts::new(
            "registry_flights",
            "Flights currently mirrored in the local registry",
        ))?;
        registry.register(Box::new(flights.clone()))?;
        let resyncs = IntGauge::with_opts(Opts::new(
            "registry_resyncs_total",
            "Completed full registry resyncs",
        ))?;
        registry.register(Box::new(resyncs.clone()))?;
        let service_gauges = GaugeVec::new(
            Opts::new("service_gauge", "Service supplied status gauges"),
            &["service", "metric"],
        )?;
        registry.register(Box::new(service_gauges.clone()))?;
        Ok(Self {
            registry,
            submissions,
            requests,
            requests_in_flight,
            flights,
            resyncs,
            service_gauges,
        })
    }

    fn render(
        &self,
        dispatch: DispatchMetricsSnapshot,
        flights: usize,
        resyncs: u64,
        statuses: &[ServiceStatusSnapshot],
    ) -> Result<Vec<u8>, MetricsError> {
        self.record_dispatch(dispatch);
        self.flights.set(flights as i64);
        self.resyncs.set(resyncs as i64);
        self.record_statuses(statuses);
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }

    fn record_dispatch(&self, snapshot: DispatchMetricsSnapshot) {
        self.requests.set(snapshot.requests as i64);
        self.requests_in_flight.set(snapshot.in_flight as i64);
        for (outcome, value) in [
            ("submitted", snapshot.submitted),
            ("skipped_unassigned", snapshot.skipped_unassigned),
            ("skipped_closed", snapshot.skipped_closed),
            ("failed", snapshot.failed),
        ] {
            self.submissions
                .with_label_values(&[outcome])
                .set(value as i64);
        }
    }

    fn record_statuses(&self, statuses: &[ServiceStatusSnapshot]) {
        for status in statuses {
            let overall = match status.overall {
                OverallStatus::Ok => 0.0,
                OverallStatus::Warn => 1.0,
                OverallStatus::Crit => 2.0,
            };
            self.service_gauges
                .with_label_values(&[status.name.as_str(), "overall_status"])
                .set(overall);
            for gauge in &status.gauges {
                let metric = metric_slug(&gauge.label);
                self.service_gauges
                    .with_label_values(&[status.name.as_str(), metric.as_str()])
                    .set(gauge.value);
            }
        }
    }
}

/// Live sources behind the `/metrics` endpoint.
pub struct ServiceMetrics {
    exporter: MetricsExporter,
    dispatch: DispatchMetrics,
    registry: Arc<FlightRegistry>,
    service_statuses: RwLock<Vec<ServiceStatusHandle>>,
}

impl ServiceMetrics {
    pub fn new(dispatch: DispatchMetrics, registry: Arc<FlightRegistry>) -> Result<Self, MetricsError> {
        Ok(Self {
            exporter: MetricsExporter::new()?,
            dispatch,
            registry,
            service_statuses: RwLock::new(Vec::new()),
        })
    }

    pub fn register_service_status(&self, handle: ServiceStatusHandle) {
        self.service_statuses.write().push(handle);
    }

    pub fn service_status_snapshots(&self) -> Vec<ServiceStatusSnapshot> {
        self.service_statuses
            .read()
            .iter()
            .map(|handle| handle.snapshot())
            .collect()
    }

    /// Prometheus text exposition of the current state.
    pub fn render(&self) -> Result<Vec<u8>, MetricsError> {
        let statuses = self.service_status_snapshots();
        self.exporter.render(
            self.dispatch.snapshot(),
            self.registry.len(),
            self.registry.resync_count(),
            &statuses,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::status::StatusGauge;

    #[test]
    fn render_exposes_every_family() {
        let metrics =
            ServiceMetrics::new(DispatchMetrics::new(), Arc::new(FlightRegistry::new())).unwrap();
        let handle = ServiceStatusHandle::new("flight_registry");
        handle.set_gauge(StatusGauge::new("Active Oracles", 3.0));
        metrics.register_service_status(handle);

        let text = String::from_utf8(metrics.render().unwrap()).unwrap();

        for name in [
            "oracle_submissions_total{outcome=\"submitted\"} 0",
            "oracle_requests_total 0",
            "registry_flights 0",
            "registry_resyncs_total 0",
            "service_gauge{metric=\"active_oracles\",service=\"flight_registry\"} 3",
            "service_gauge{metric=\"overall_status\",service=\"flight_registry\"} 1",
        ] {
            assert!(text.contains(name), "missing {name} in:\n{text}");
        }
    }

    #[test]
    fn exporters_do_not_collide() {
        let first = ServiceMetrics::new(DispatchMetrics::new(), Arc::new(FlightRegistry::new()));
        let second = ServiceMetrics::new(DispatchMetrics::new(), Arc::new(FlightRegistry::new()));
        assert!(first.is_ok());
        assert!(second.is_ok());
    }
}
