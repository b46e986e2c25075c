// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Oracle registration: registers simulated oracle identities with the ledger
//! and records the index triple the ledger assigns to each one.
//!
//! Every identity registers as its own task. A failure for one identity drops
//! that identity for the lifetime of the process and never affects the others.

use std::sync::Arc;

use core_types::{
    status::{OverallStatus, ServiceStatusHandle, StatusGauge},
    Address, IndexError, Oracle, OracleIndexes, OracleSet,
};
use ledger_client::{LedgerClient, LedgerError};
use log::{error, info, warn};
use thiserror::Error;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("registration task for {identity} failed: {reason}")]
    TaskFailed { identity: Address, reason: String },
    #[error("ledger assigned invalid indexes to {identity}: {source}")]
    InvalidIndexes {
        identity: Address,
        #[source]
        source: IndexError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered(Oracle),
    Dropped {
        identity: Address,
        cause: RegistrationError,
    },
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationReport {
    outcomes: Vec<RegistrationOutcome>,
}

impl RegistrationReport {
    pub fn outcomes(&self) -> &[RegistrationOutcome] {
        &self.outcomes
    }

    pub fn registered(&self) -> impl Iterator<Item = &Oracle> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            RegistrationOutcome::Registered(oracle) => Some(oracle),
            RegistrationOutcome::Dropped { .. } => None,
        })
    }

    pub fn dropped(&self) -> impl Iterator<Item = (&Address, &RegistrationError)> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            RegistrationOutcome::Dropped { identity, cause } => Some((identity, cause)),
            RegistrationOutcome::Registered(_) => None,
        })
    }

    /// Active oracle set, in account-pool order.
    pub fn oracle_set(&self) -> OracleSet {
        OracleSet::new(self.registered().copied().collect())
    }
}

pub struct OracleRegistrationService {
    ledger: Arc<dyn LedgerClient>,
    status: ServiceStatusHandle,
}

impl OracleRegistrationService {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        let status = ServiceStatusHandle::new("oracle_registration");
        status.push_warning("oracle registration not started");
        Self { ledger, status }
    }

    pub fn status_handle(&self) -> ServiceStatusHandle {
        self.status.clone()
    }

    /// Registers the last `count` accounts of the ledger's pool as oracles.
    ///
    /// Only a failure to read the account pool is returned as an error;
    /// per-identity failures are reported as [`RegistrationOutcome::Dropped`].
    pub async fn register(&self, count: usize) -> Result<RegistrationReport, RegistrationError> {
        let accounts = match self.ledger.accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                self.status.set_overall(OverallStatus::Crit);
                self.status
                    .push_error(format!("failed to read account pool: {err}"));
                return Err(err.into());
            }
        };
        let candidates = select_candidates(&accounts, count);
        if candidates.len() < count {
            warn!(
                "requested {count} oracles but the account pool only holds {}",
                candidates.len()
            );
        }

        let mut tasks = JoinSet::new();
        for (slot, identity) in candidates.iter().copied().enumerate() {
            let ledger = Arc::clone(&self.ledger);
            tasks.spawn(async move { (slot, register_one(ledger.as_ref(), identity).await) });
        }

        let mut slotted = Vec::with_capacity(candidates.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, Ok(oracle))) => {
                    info!(
                        "oracle {} registered with indexes {}",
                        oracle.identity, oracle.indexes
                    );
                    slotted.push((slot, RegistrationOutcome::Registered(oracle)));
                }
                Ok((slot, Err(cause))) => {
                    let identity = candidates[slot];
                    warn!("oracle {identity} dropped from active set: {cause}");
                    slotted.push((slot, RegistrationOutcome::Dropped { identity, cause }));
                }
                Err(err) => error!("oracle registration task failed: {err}"),
            }
        }
        // Tasks that panicked never reported their slot.
        let mut reported = vec![false; candidates.len()];
        for (slot, _) in &slotted {
            reported[*slot] = true;
        }
        for (slot, identity) in candidates.iter().copied().enumerate() {
            if !reported[slot] {
                let cause = RegistrationError::TaskFailed {
                    identity,
                    reason: "task ended without a result".to_string(),
                };
                warn!("oracle {identity} dropped from active set: {cause}");
                slotted.push((slot, RegistrationOutcome::Dropped { identity, cause }));
            }
        }
        slotted.sort_by_key(|(slot, _)| *slot);

        let report = RegistrationReport {
            outcomes: slotted.into_iter().map(|(_, outcome)| outcome).collect(),
        };
        self.publish_status(&report);
        Ok(report)
    }

    fn publish_status(&self, report: &RegistrationReport) {
        let registered = report.registered().count();
        let dropped = report.dropped().count();
        self.status.clear_warnings();
        self.status
            .set_gauge(StatusGauge::new("registered_oracles", registered as f64).with_unit("oracles"));
        self.status
            .set_gauge(StatusGauge::new("dropped_oracles", dropped as f64).with_unit("oracles"));
        if registered == 0 && dropped > 0 {
            self.status.set_overall(OverallStatus::Crit);
            self.status
                .push_error("no oracle identity could be registered");
        } else if dropped > 0 {
            self.status.set_overall(OverallStatus::Warn);
            self.status
                .push_warning(format!("{dropped} oracle identities dropped at registration"));
        } else {
            self.status.set_overall(OverallStatus::Ok);
        }
    }
}

/// The last `count` accounts; earlier ones are reserved for other roles.
fn select_candidates(accounts: &[Address], count: usize) -> &[Address] {
    let skip = accounts.len().saturating_sub(count);
    &accounts[skip..]
}

async fn register_one(
    ledger: &dyn LedgerClient,
    identity: Address,
) -> Result<Oracle, RegistrationError> {
    let fee = ledger.registration_fee().await?;
    ledger.register_oracle(identity, fee).await?;
    let raw = ledger.get_my_indexes(identity).await?;
    let indexes = OracleIndexes::new(raw)
        .map_err(|source| RegistrationError::InvalidIndexes { identity, source })?;
    Ok(Oracle { identity, indexes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{
        FlightKey, FlightRecord, LedgerEvent, OracleResponseInfo, StatusCode, StatusRequest, Wei,
    };
    use ledger_client::{LedgerResult, SimulatedLedger, SimulatedLedgerConfig};
    use tokio::sync::broadcast;

    fn ledger_with_pool(size: usize) -> Arc<SimulatedLedger> {
        Arc::new(SimulatedLedger::new(SimulatedLedgerConfig {
            account_pool_size: size,
            ..SimulatedLedgerConfig::default()
        }))
    }

    #[test]
    fn candidates_come_from_the_end_of_the_pool() {
        let pool: Vec<Address> = (0..5u8).map(|b| Address::new([b; 20])).collect();
        assert_eq!(select_candidates(&pool, 2), &pool[3..]);
        assert_eq!(select_candidates(&pool, 9), &pool[..]);
        assert!(select_candidates(&pool, 0).is_empty());
    }

    #[tokio::test]
    async fn every_registered_oracle_has_three_distinct_indexes() {
        for count in 0..=10 {
            let ledger = ledger_with_pool(10);
            let service = OracleRegistrationService::new(ledger.clone());
            let report = service.register(count).await.unwrap();
            let set = report.oracle_set();
            assert!(set.len() <= count);
            assert_eq!(set.len(), count);
            for oracle in set.iter() {
                let indexes = oracle.indexes.as_array();
                assert!(OracleIndexes::new(indexes).is_ok());
            }
            assert_eq!(ledger.registered_oracle_count(), count);
        }
    }

    #[tokio::test]
    async fn one_failing_identity_does_not_abort_the_rest() {
        let ledger = ledger_with_pool(10);
        let rejected = ledger.account(8).unwrap();
        ledger.reject_registrations_from(rejected);
        let service = OracleRegistrationService::new(ledger.clone());

        let report = service.register(3).await.unwrap();

        let registered: Vec<Address> = report.registered().map(|o| o.identity).collect();
        assert_eq!(
            registered,
            vec![ledger.account(7).unwrap(), ledger.account(9).unwrap()]
        );
        let dropped: Vec<&Address> = report.dropped().map(|(identity, _)| identity).collect();
        assert_eq!(dropped, vec![&rejected]);
        assert_eq!(service.status_handle().overall(), OverallStatus::Warn);
    }

    #[tokio::test]
    async fn already_registered_identity_is_dropped_without_retry() {
        let ledger = ledger_with_pool(4);
        let service = OracleRegistrationService::new(ledger.clone());
        service.register(2).await.unwrap();

        let second = service.register(2).await.unwrap();
        assert_eq!(second.registered().count(), 0);
        assert!(second.dropped().all(|(_, cause)| matches!(
            cause,
            RegistrationError::Ledger(LedgerError::AlreadyRegistered { .. })
        )));
        assert_eq!(service.status_handle().overall(), OverallStatus::Crit);
    }

    enum IndexFault {
        Duplicate,
        PanicFor(Address),
    }

    struct FaultyIndexLedger {
        inner: SimulatedLedger,
        fault: IndexFault,
    }

    #[async_trait::async_trait]
    impl LedgerClient for FaultyIndexLedger {
        async fn accounts(&self) -> LedgerResult<Vec<Address>> {
            self.inner.accounts().await
        }
        async fn is_operational(&self) -> LedgerResult<bool> {
            self.inner.is_operational().await
        }
        async fn registration_fee(&self) -> LedgerResult<Wei> {
            self.inner.registration_fee().await
        }
        async fn register_oracle(&self, from: Address, fee: Wei) -> LedgerResult<()> {
            self.inner.register_oracle(from, fee).await
        }
        async fn get_my_indexes(&self, from: Address) -> LedgerResult<[u8; 3]> {
            match self.fault {
                IndexFault::Duplicate => Ok([4, 4, 1]),
                IndexFault::PanicFor(identity) if identity == from => {
                    panic!("index lookup blew up")
                }
                IndexFault::PanicFor(_) => self.inner.get_my_indexes(from).await,
            }
        }
        async fn submit_oracle_response(
            &self,
            from: Address,
            request: &StatusRequest,
            status: StatusCode,
        ) -> LedgerResult<()> {
            self.inner.submit_oracle_response(from, request, status).await
        }
        async fn total_flight(&self) -> LedgerResult<u64> {
            self.inner.total_flight().await
        }
        async fn get_flight_detail(&self, id: u64) -> LedgerResult<FlightRecord> {
            self.inner.get_flight_detail(id).await
        }
        async fn get_flight_key(
            &self,
            airline: Address,
            flight: &str,
            timestamp: u64,
        ) -> LedgerResult<FlightKey> {
            self.inner.get_flight_key(airline, flight, timestamp).await
        }
        async fn get_flight_id_by_key(&self, key: FlightKey) -> LedgerResult<u64> {
            self.inner.get_flight_id_by_key(key).await
        }
        async fn oracle_responses(&self, key: FlightKey) -> LedgerResult<OracleResponseInfo> {
            self.inner.oracle_responses(key).await
        }
        fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn malformed_index_triple_drops_the_identity() {
        let ledger = Arc::new(FaultyIndexLedger {
            inner: SimulatedLedger::default(),
            fault: IndexFault::Duplicate,
        });
        let service = OracleRegistrationService::new(ledger);
        let report = service.register(1).await.unwrap();
        assert!(report.oracle_set().is_empty());
        let (_, cause) = report.dropped().next().unwrap();
        assert!(matches!(cause, RegistrationError::InvalidIndexes { .. }));
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_dropped() {
        let inner = SimulatedLedger::new(SimulatedLedgerConfig {
            account_pool_size: 5,
            ..SimulatedLedgerConfig::default()
        });
        let victim = inner.account(3).unwrap();
        let ledger = Arc::new(FaultyIndexLedger {
            inner,
            fault: IndexFault::PanicFor(victim),
        });
        let service = OracleRegistrationService::new(ledger);

        let report = service.register(2).await.unwrap();

        assert_eq!(report.outcomes().len(), 2);
        assert_eq!(report.registered().count(), 1);
        let (identity, cause) = report.dropped().next().unwrap();
        assert_eq!(*identity, victim);
        assert!(matches!(cause, RegistrationError::TaskFailed { .. }));
        assert!(matches!(
            report.outcomes()[0],
            RegistrationOutcome::Dropped { .. }
        ));
        assert_eq!(service.status_handle().overall(), OverallStatus::Warn);
    }
}
