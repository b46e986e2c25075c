// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Local, read-optimised mirror of the ledger's flights.
//!
//! [`FlightRegistry`] owns the records behind a lock; [`FlightRegistryReconciler`]
//! is the only writer. It applies `FlightRegistered` events incrementally,
//! refreshes a record when its status is settled, and can rebuild the whole
//! registry from the ledger at any time. Ledger reads always finish before the
//! lock is taken.

mod registry;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use core_types::{
    status::{OverallStatus, ServiceStatusHandle, StatusGauge},
    Address, FlightRecord, LedgerEvent,
};
use ledger_client::{LedgerClient, LedgerError};
use log::{info, warn};
use parking_lot::RwLock;
use thiserror::Error;

pub use registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("resync aborted at flight {id} of {total}: {source}")]
    ResyncAborted {
        id: u64,
        total: u64,
        #[source]
        source: LedgerError,
    },
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Shared flight registry. Readers only ever see whole records.
#[derive(Default)]
pub struct FlightRegistry {
    inner: RwLock<Registry>,
    resyncs: AtomicU64,
}

impl FlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<FlightRecord> {
        self.inner.read().get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<FlightRecord> {
        self.inner.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Completed resyncs since startup.
    pub fn resync_count(&self) -> u64 {
        self.resyncs.load(Ordering::Relaxed)
    }

    fn upsert(&self, record: FlightRecord) -> bool {
        self.inner.write().upsert(record)
    }

    fn merge(&self, record: FlightRecord) -> bool {
        self.inner.write().merge(record)
    }

    fn max_id(&self) -> u64 {
        self.inner.read().max_id()
    }

    fn clear(&self) {
        self.inner.write().clear();
    }
}

pub struct FlightRegistryReconciler {
    ledger: Arc<dyn LedgerClient>,
    registry: Arc<FlightRegistry>,
    status: ServiceStatusHandle,
}

impl FlightRegistryReconciler {
    pub fn new(ledger: Arc<dyn LedgerClient>, registry: Arc<FlightRegistry>) -> Self {
        let status = ServiceStatusHandle::new("flight_registry");
        status.push_warning("registry not yet synchronised");
        Self {
            ledger,
            registry,
            status,
        }
    }

    pub fn registry(&self) -> Arc<FlightRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn status_handle(&self) -> ServiceStatusHandle {
        self.status.clone()
    }

    /// Routes the events that change registry contents; others are ignored.
    pub async fn handle_event(&self, event: &LedgerEvent) -> ReconcileResult<Option<FlightRecord>> {
        match event {
            LedgerEvent::FlightRegistered { .. } => self.apply_flight_registered().await.map(Some),
            LedgerEvent::FlightProcessed {
                airline,
                flight,
                timestamp,
                ..
            } => self.refresh_flight(*airline, flight, *timestamp).await.map(Some),
            _ => Ok(None),
        }
    }

    /// The newest flight is the one at the ledger's current flight count.
    ///
    /// Ids between the highest one held and that count are backfilled first,
    /// so a burst of registrations handled after the fact still lands every
    /// flight.
    pub async fn apply_flight_registered(&self) -> ReconcileResult<FlightRecord> {
        let total = self.ledger.total_flight().await?;
        let known = self.registry.max_id();
        if total > known.saturating_add(1) {
            info!("registry behind ledger ({known} of {total}); backfilling");
            for id in known + 1..total {
                let record = self.ledger.get_flight_detail(id).await?;
                self.registry.merge(record);
            }
        }
        let record = self.ledger.get_flight_detail(total).await?;
        if self.registry.merge(record.clone()) {
            info!("registry added flight {} ({})", record.id, record.flight_name);
        }
        self.publish_gauges();
        Ok(record)
    }

    /// Re-fetches one flight by composite identity, replacing the stored record.
    pub async fn refresh_flight(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
    ) -> ReconcileResult<FlightRecord> {
        let key = self.ledger.get_flight_key(airline, flight, timestamp).await?;
        let id = self.ledger.get_flight_id_by_key(key).await?;
        let record = self.ledger.get_flight_detail(id).await?;
        self.registry.upsert(record.clone());
        info!(
            "registry refreshed flight {} ({}) status {}",
            record.id, record.flight_name, record.status_code
        );
        self.publish_gauges();
        Ok(record)
    }

    /// Rebuilds the registry from ids `1..=totalFlight`, returning the count.
    ///
    /// A failed fetch aborts the resync; records upserted before the failure
    /// stay in place.
    pub async fn resync(&self) -> ReconcileResult<usize> {
        self.registry.clear();
        let total = match self.ledger.total_flight().await {
            Ok(total) => total,
            Err(err) => return Err(self.resync_failed(err.into())),
        };
        for id in 1..=total {
            match self.ledger.get_flight_detail(id).await {
                Ok(record) => {
                    // A concurrent status refresh may already hold a newer record.
                    self.registry.merge(record);
                }
                Err(source) => {
                    return Err(self.resync_failed(ReconcileError::ResyncAborted {
                        id,
                        total,
                        source,
                    }))
                }
            }
        }
        self.registry.resyncs.fetch_add(1, Ordering::Relaxed);
        let count = self.registry.len();
        info!("registry resynced {count} flights");
        self.status.clear_warnings();
        self.status.clear_errors_matching(|e| e.starts_with("resync"));
        self.status.set_overall(OverallStatus::Ok);
        self.publish_gauges();
        Ok(count)
    }

    fn resync_failed(&self, err: ReconcileError) -> ReconcileError {
        warn!("registry resync failed: {err}");
        self.status.set_overall(OverallStatus::Crit);
        self.status.push_error(format!("resync failed: {err}"));
        self.publish_gauges();
        err
    }

    fn publish_gauges(&self) {
        self.status
            .set_gauge(StatusGauge::new("flights", self.registry.len() as f64).with_unit("flights"));
        self.status
            .set_gauge(StatusGauge::new("resyncs", self.registry.resync_count() as f64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_client::SimulatedLedger;

    fn reconciler(ledger: &Arc<SimulatedLedger>) -> FlightRegistryReconciler {
        FlightRegistryReconciler::new(ledger.clone(), Arc::new(FlightRegistry::new()))
    }

    #[tokio::test]
    async fn empty_ledger_resyncs_to_empty_registry() {
        let ledger = Arc::new(SimulatedLedger::default());
        let reconciler = reconciler(&ledger);
        assert_eq!(reconciler.resync().await.unwrap(), 0);
        assert!(reconciler.registry().is_empty());
        assert_eq!(reconciler.registry().resync_count(), 1);
        assert_eq!(reconciler.status_handle().overall(), OverallStatus::Ok);
    }

    #[tokio::test]
    async fn incremental_apply_backfills_missed_flights() {
        let ledger = Arc::new(SimulatedLedger::default());
        let owner = ledger.owner();
        let reconciler = reconciler(&ledger);
        ledger.register_flight(owner, "F1", 1000).unwrap();
        ledger.register_flight(owner, "F2", 2000).unwrap();

        let record = reconciler.apply_flight_registered().await.unwrap();
        assert_eq!(record.id, 2);
        assert_eq!(record.flight_name, "F2");
        assert_eq!(reconciler.registry().len(), 2);
        assert_eq!(reconciler.registry().get(1).unwrap().flight_name, "F1");
    }

    #[tokio::test]
    async fn duplicate_registration_event_leaves_one_record() {
        let ledger = Arc::new(SimulatedLedger::default());
        let owner = ledger.owner();
        let reconciler = reconciler(&ledger);
        ledger.register_flight(owner, "F1", 1000).unwrap();
        let event = LedgerEvent::FlightRegistered {
            flight: "F1".to_string(),
            timestamp: 1000,
        };

        reconciler.handle_event(&event).await.unwrap();
        reconciler.handle_event(&event).await.unwrap();

        assert_eq!(reconciler.registry().len(), 1);
    }

    #[tokio::test]
    async fn unrelated_events_are_ignored() {
        let ledger = Arc::new(SimulatedLedger::default());
        let reconciler = reconciler(&ledger);
        let event = LedgerEvent::AirlineRegistered {
            airline: ledger.owner(),
        };
        assert_eq!(reconciler.handle_event(&event).await.unwrap(), None);
    }

    #[tokio::test]
    async fn apply_on_empty_ledger_surfaces_the_ledger_error() {
        let ledger = Arc::new(SimulatedLedger::default());
        let reconciler = reconciler(&ledger);
        let err = reconciler.apply_flight_registered().await.unwrap_err();
        assert_eq!(err, ReconcileError::Ledger(LedgerError::FlightNotFound { id: 0 }));
    }

    #[tokio::test]
    async fn burst_of_registrations_lands_every_flight() {
        let ledger = Arc::new(SimulatedLedger::default());
        let owner = ledger.owner();
        let reconciler = reconciler(&ledger);
        reconciler.resync().await.unwrap();
        for (flight, timestamp) in [("F1", 1000), ("F2", 2000), ("F3", 3000), ("F4", 4000)] {
            ledger.register_flight(owner, flight, timestamp).unwrap();
        }
        let event = LedgerEvent::FlightRegistered {
            flight: "F4".to_string(),
            timestamp: 4000,
        };

        for _ in 0..4 {
            reconciler.handle_event(&event).await.unwrap();
        }

        let total = ledger.total_flight().await.unwrap();
        assert_eq!(reconciler.registry().len() as u64, total);
        let ids: Vec<u64> = reconciler.registry().snapshot().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }
}
