// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! In-process ledger that models the contract pair closely enough to drive the
//! service in dev mode and in tests.
//!
//! Consensus is modelled only as far as the service can observe it: responses
//! accumulate per status code and the request closes once `min_responses`
//! oracles agree.

use std::collections::{HashMap, HashSet};

use core_types::{
    Address, FlightKey, FlightRecord, LedgerEvent, OracleIndexes, OracleResponseInfo, StatusCode,
    StatusRequest, Wei, MAX_ORACLE_INDEX, WEI_PER_ETHER,
};
use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use crate::{
    bus::{EventBus, DEFAULT_EVENT_CAPACITY},
    client::{LedgerClient, LedgerError, LedgerResult},
};

pub const DEFAULT_ACCOUNT_POOL: usize = 10;
pub const DEFAULT_REGISTRATION_FEE: Wei = WEI_PER_ETHER;
pub const DEFAULT_MIN_RESPONSES: usize = 3;

#[derive(Debug, Clone)]
pub struct SimulatedLedgerConfig {
    pub account_pool_size: usize,
    pub registration_fee: Wei,
    pub min_responses: usize,
    pub event_capacity: usize,
}

impl Default for SimulatedLedgerConfig {
    fn default() -> Self {
        Self {
            account_pool_size: DEFAULT_ACCOUNT_POOL,
            registration_fee: DEFAULT_REGISTRATION_FEE,
            min_responses: DEFAULT_MIN_RESPONSES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// One `submitOracleResponse` call as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub oracle: Address,
    pub index: u8,
    pub key: FlightKey,
    pub status: StatusCode,
    pub accepted: bool,
}

/// Hash the ledger uses to alias `(airline, flight, timestamp)`.
pub fn derive_flight_key(airline: Address, flight: &str, timestamp: u64) -> FlightKey {
    let mut hasher = Sha256::new();
    hasher.update(airline.as_bytes());
    hasher.update(flight.as_bytes());
    hasher.update(timestamp.to_be_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hasher.finalize());
    FlightKey::new(bytes)
}

fn account_address(slot: usize) -> Address {
    let digest = Sha256::digest(format!("simulated-account-{slot}").as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest[12..]);
    Address::new(bytes)
}

fn random_indexes() -> [u8; 3] {
    let mut rng = rand::thread_rng();
    let picks = rand::seq::index::sample(&mut rng, usize::from(MAX_ORACLE_INDEX) + 1, 3);
    let mut out = [0u8; 3];
    for (slot, pick) in out.iter_mut().zip(picks.iter()) {
        *slot = pick as u8;
    }
    out
}

struct ResponseWindow {
    requester: Address,
    index: u8,
    is_open: bool,
    status: StatusCode,
    responders: HashSet<Address>,
    votes: HashMap<StatusCode, usize>,
}

struct SimState {
    operational: bool,
    accounts: Vec<Address>,
    oracles: HashMap<Address, [u8; 3]>,
    airlines: HashSet<Address>,
    flights: Vec<FlightRecord>,
    flight_ids: HashMap<FlightKey, u64>,
    responses: HashMap<FlightKey, ResponseWindow>,
    rejected_registrations: HashSet<Address>,
    forced_indexes: HashMap<Address, [u8; 3]>,
    submissions: Vec<SubmissionRecord>,
}

impl SimState {
    fn require_operational(&self) -> LedgerResult<()> {
        if self.operational {
            Ok(())
        } else {
            Err(LedgerError::NotOperational)
        }
    }

    fn register_oracle(&mut self, from: Address, fee: Wei, required: Wei) -> LedgerResult<[u8; 3]> {
        self.require_operational()?;
        if !self.accounts.contains(&from) {
            return Err(LedgerError::UnknownAccount { account: from });
        }
        if self.rejected_registrations.contains(&from) {
            return Err(LedgerError::reverted("registration rejected for account"));
        }
        if self.oracles.contains_key(&from) {
            return Err(LedgerError::AlreadyRegistered { oracle: from });
        }
        if fee < required {
            return Err(LedgerError::InsufficientFee {
                required,
                offered: fee,
            });
        }
        let indexes = self
            .forced_indexes
            .get(&from)
            .copied()
            .unwrap_or_else(random_indexes);
        self.oracles.insert(from, indexes);
        Ok(indexes)
    }

    fn accept_response(
        &mut self,
        from: Address,
        request: &StatusRequest,
        status: StatusCode,
        min_responses: usize,
        events: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<()> {
        self.require_operational()?;
        let assigned = self
            .oracles
            .get(&from)
            .ok_or(LedgerError::NotRegistered { oracle: from })?;
        if !assigned.contains(&request.index) {
            return Err(LedgerError::IndexMismatch {
                index: request.index,
            });
        }
        let key = derive_flight_key(request.airline, &request.flight, request.timestamp);
        let window = self.responses.get_mut(&key).ok_or_else(|| {
            LedgerError::reverted("flight or timestamp do not match oracle request")
        })?;
        if window.index != request.index {
            return Err(LedgerError::IndexMismatch {
                index: request.index,
            });
        }
        if !window.is_open {
            return Err(LedgerError::RequestClosed { key });
        }
        if !window.responders.insert(from) {
            return Err(LedgerError::reverted("oracle already responded"));
        }
        let votes = window.votes.entry(status).or_insert(0);
        *votes += 1;
        events.push(LedgerEvent::OracleReport {
            index: request.index,
            airline: request.airline,
            flight: request.flight.clone(),
            timestamp: request.timestamp,
        });
        if *votes < min_responses {
            return Ok(());
        }

        window.is_open = false;
        window.status = status;
        if let Some(&id) = self.flight_ids.get(&key) {
            if let Some(record) = self.flights.get_mut((id - 1) as usize) {
                record.status_code = status;
            }
        }
        events.push(LedgerEvent::FlightStatusInfo {
            airline: request.airline,
            flight: request.flight.clone(),
            timestamp: request.timestamp,
            status,
        });
        events.push(LedgerEvent::FlightProcessed {
            airline: request.airline,
            flight: request.flight.clone(),
            timestamp: request.timestamp,
            status,
        });
        Ok(())
    }
}

pub struct SimulatedLedger {
    config: SimulatedLedgerConfig,
    state: Mutex<SimState>,
    bus: EventBus,
}

impl SimulatedLedger {
    /// Builds the ledger with a deterministic account pool; account 0 is the
    /// contract owner and the first registered airline.
    pub fn new(config: SimulatedLedgerConfig) -> Self {
        let accounts: Vec<Address> = (0..config.account_pool_size.max(1))
            .map(account_address)
            .collect();
        let mut airlines = HashSet::new();
        airlines.insert(accounts[0]);
        let state = SimState {
            operational: true,
            accounts,
            oracles: HashMap::new(),
            airlines,
            flights: Vec::new(),
            flight_ids: HashMap::new(),
            responses: HashMap::new(),
            rejected_registrations: HashSet::new(),
            forced_indexes: HashMap::new(),
            submissions: Vec::new(),
        };
        Self {
            bus: EventBus::new(config.event_capacity),
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &SimulatedLedgerConfig {
        &self.config
    }

    pub fn owner(&self) -> Address {
        self.state.lock().accounts[0]
    }

    pub fn account(&self, slot: usize) -> Option<Address> {
        self.state.lock().accounts.get(slot).copied()
    }

    pub fn set_operational(&self, operational: bool) {
        self.state.lock().operational = operational;
    }

    pub fn register_airline(&self, from: Address, airline: Address) -> LedgerResult<()> {
        {
            let mut state = self.state.lock();
            state.require_operational()?;
            if !state.airlines.contains(&from) {
                return Err(LedgerError::reverted("caller is not a registered airline"));
            }
            if !state.airlines.insert(airline) {
                return Err(LedgerError::reverted("airline already registered"));
            }
        }
        info!("simulated ledger registered airline {airline}");
        self.bus.publish(LedgerEvent::AirlineRegistered { airline });
        Ok(())
    }

    /// Registers a flight for the calling airline and returns its ledger id.
    pub fn register_flight(&self, from: Address, flight: &str, timestamp: u64) -> LedgerResult<u64> {
        let id = {
            let mut state = self.state.lock();
            state.require_operational()?;
            if !state.airlines.contains(&from) {
                return Err(LedgerError::reverted("caller is not a registered airline"));
            }
            let key = derive_flight_key(from, flight, timestamp);
            if state.flight_ids.contains_key(&key) {
                return Err(LedgerError::reverted("flight already registered"));
            }
            let id = state.flights.len() as u64 + 1;
            state.flights.push(FlightRecord {
                id,
                key,
                flight_name: flight.to_string(),
                airline: from,
                departure_time: timestamp,
                status_code: StatusCode::Unknown,
            });
            state.flight_ids.insert(key, id);
            id
        };
        self.bus.publish(LedgerEvent::FlightRegistered {
            flight: flight.to_string(),
            timestamp,
        });
        Ok(id)
    }

    /// Opens a status request under a random index, as the contract does.
    pub fn fetch_flight_status(
        &self,
        from: Address,
        airline: Address,
        flight: &str,
        timestamp: u64,
    ) -> LedgerResult<u8> {
        let index = rand::thread_rng().gen_range(0..=MAX_ORACLE_INDEX);
        self.open_status_request(from, airline, flight, timestamp, index)?;
        Ok(index)
    }

    /// Opens a status request under a caller-chosen index.
    pub fn open_status_request(
        &self,
        from: Address,
        airline: Address,
        flight: &str,
        timestamp: u64,
        index: u8,
    ) -> LedgerResult<()> {
        if index > MAX_ORACLE_INDEX {
            return Err(LedgerError::IndexMismatch { index });
        }
        {
            let mut state = self.state.lock();
            state.require_operational()?;
            let key = derive_flight_key(airline, flight, timestamp);
            state.responses.insert(
                key,
                ResponseWindow {
                    requester: from,
                    index,
                    is_open: true,
                    status: StatusCode::Unknown,
                    responders: HashSet::new(),
                    votes: HashMap::new(),
                },
            );
        }
        self.bus.publish(LedgerEvent::OracleRequest {
            index,
            airline,
            flight: flight.to_string(),
            timestamp,
        });
        Ok(())
    }

    /// Makes every future registration from `account` revert.
    pub fn reject_registrations_from(&self, account: Address) {
        self.state.lock().rejected_registrations.insert(account);
    }

    /// Pins the index triple handed to `account` when it registers.
    pub fn force_indexes(&self, account: Address, indexes: OracleIndexes) {
        self.state
            .lock()
            .forced_indexes
            .insert(account, indexes.as_array());
    }

    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state.lock().submissions.clone()
    }

    pub fn registered_oracle_count(&self) -> usize {
        self.state.lock().oracles.len()
    }
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new(SimulatedLedgerConfig::default())
    }
}

#[async_trait::async_trait]
impl LedgerClient for SimulatedLedger {
    async fn accounts(&self) -> LedgerResult<Vec<Address>> {
        Ok(self.state.lock().accounts.clone())
    }

    async fn is_operational(&self) -> LedgerResult<bool> {
        Ok(self.state.lock().operational)
    }

    async fn registration_fee(&self) -> LedgerResult<Wei> {
        Ok(self.config.registration_fee)
    }

    async fn register_oracle(&self, from: Address, fee: Wei) -> LedgerResult<()> {
        let indexes = self
            .state
            .lock()
            .register_oracle(from, fee, self.config.registration_fee)?;
        debug!(
            "simulated ledger registered oracle {from} with indexes {:?}",
            indexes
        );
        self.bus.publish(LedgerEvent::OracleRegistered { indexes });
        Ok(())
    }

    async fn get_my_indexes(&self, from: Address) -> LedgerResult<[u8; 3]> {
        self.state
            .lock()
            .oracles
            .get(&from)
            .copied()
            .ok_or(LedgerError::NotRegistered { oracle: from })
    }

    async fn submit_oracle_response(
        &self,
        from: Address,
        request: &StatusRequest,
        status: StatusCode,
    ) -> LedgerResult<()> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            let result = state.accept_response(
                from,
                request,
                status,
                self.config.min_responses,
                &mut events,
            );
            state.submissions.push(SubmissionRecord {
                oracle: from,
                index: request.index,
                key: derive_flight_key(request.airline, &request.flight, request.timestamp),
                status,
                accepted: result.is_ok(),
            });
            result
        };
        for event in events {
            self.bus.publish(event);
        }
        result
    }

    async fn total_flight(&self) -> LedgerResult<u64> {
        Ok(self.state.lock().flights.len() as u64)
    }

    async fn get_flight_detail(&self, id: u64) -> LedgerResult<FlightRecord> {
        let state = self.state.lock();
        id.checked_sub(1)
            .and_then(|slot| state.flights.get(slot as usize))
            .cloned()
            .ok_or(LedgerError::FlightNotFound { id })
    }

    async fn get_flight_key(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
    ) -> LedgerResult<FlightKey> {
        Ok(derive_flight_key(airline, flight, timestamp))
    }

    async fn get_flight_id_by_key(&self, key: FlightKey) -> LedgerResult<u64> {
        self.state
            .lock()
            .flight_ids
            .get(&key)
            .copied()
            .ok_or(LedgerError::UnknownFlightKey { key })
    }

    /// Unset slots read back as the zero value, matching contract storage.
    async fn oracle_responses(&self, key: FlightKey) -> LedgerResult<OracleResponseInfo> {
        let state = self.state.lock();
        Ok(match state.responses.get(&key) {
            Some(window) => OracleResponseInfo {
                key,
                requester: window.requester,
                is_open: window.is_open,
                status_code: window.status,
            },
            None => OracleResponseInfo {
                key,
                requester: Address::ZERO,
                is_open: false,
                status_code: StatusCode::Unknown,
            },
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.bus.subscribe()
    }
}
