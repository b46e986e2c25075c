// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use crate::{DispatchOutcome, SkipReason};

#[derive(Default)]
struct DispatchMetricsInner {
    requests: AtomicU64,
    in_flight: AtomicU64,
    submitted: AtomicU64,
    skipped_unassigned: AtomicU64,
    skipped_closed: AtomicU64,
    failed: AtomicU64,
}

/// Cumulative dispatch counters, shared with the metrics exporter.
#[derive(Clone, Default)]
pub struct DispatchMetrics {
    inner: Arc<DispatchMetricsInner>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchMetricsSnapshot {
    pub requests: u64,
    pub in_flight: u64,
    pub submitted: u64,
    pub skipped_unassigned: u64,
    pub skipped_closed: u64,
    pub failed: u64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn request_started(&self) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn request_finished(&self) {
        let _ = self
            .inner
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub(crate) fn record(&self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Submitted { .. } => &self.inner.submitted,
            DispatchOutcome::Skipped {
                reason: SkipReason::IndexNotAssigned,
                ..
            } => &self.inner.skipped_unassigned,
            DispatchOutcome::Skipped {
                reason: SkipReason::RequestClosed,
                ..
            } => &self.inner.skipped_closed,
            DispatchOutcome::Failed { .. } => &self.inner.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            requests: self.inner.requests.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            skipped_unassigned: self.inner.skipped_unassigned.load(Ordering::Relaxed),
            skipped_closed: self.inner.skipped_closed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }
}
