// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::collections::BTreeMap;

use core_types::{FlightRecord, StatusCode};

/// Flights keyed by ledger id. Upserts replace whole records.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    flights: BTreeMap<u64, FlightRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the id was not present before.
    pub fn upsert(&mut self, record: FlightRecord) -> bool {
        self.flights.insert(record.id, record).is_none()
    }

    /// Like [`Registry::upsert`], but a record still reporting
    /// [`StatusCode::Unknown`] never replaces one whose status has settled.
    /// Oracles cannot report `Unknown`, so the settled record is the newer one.
    pub fn merge(&mut self, record: FlightRecord) -> bool {
        match self.flights.get(&record.id) {
            Some(existing)
                if existing.status_code != StatusCode::Unknown
                    && record.status_code == StatusCode::Unknown =>
            {
                false
            }
            _ => self.upsert(record),
        }
    }

    /// Highest id held, or 0 when empty.
    pub fn max_id(&self) -> u64 {
        self.flights.keys().next_back().copied().unwrap_or(0)
    }

    pub fn get(&self, id: u64) -> Option<&FlightRecord> {
        self.flights.get(&id)
    }

    pub fn clear(&mut self) {
        self.flights.clear();
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    /// Records in ascending id order.
    pub fn snapshot(&self) -> Vec<FlightRecord> {
        self.flights.values().cloned().collect()
    }
}
