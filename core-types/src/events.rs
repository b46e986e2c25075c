// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Ledger event values delivered to the service's listeners.

use std::fmt;

use crate::types::{Address, StatusCode, StatusRequest};

/// Event streams the service subscribes to, one listener per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OracleRegistered,
    AirlineRegistered,
    FlightRegistered,
    OracleRequest,
    OracleReport,
    FlightStatusInfo,
    FlightProcessed,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::OracleRegistered,
        EventKind::AirlineRegistered,
        EventKind::FlightRegistered,
        EventKind::OracleRequest,
        EventKind::OracleReport,
        EventKind::FlightStatusInfo,
        EventKind::FlightProcessed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EventKind::OracleRegistered => "OracleRegistered",
            EventKind::AirlineRegistered => "AirlineRegistered",
            EventKind::FlightRegistered => "FlightRegistered",
            EventKind::OracleRequest => "OracleRequest",
            EventKind::OracleReport => "OracleReport",
            EventKind::FlightStatusInfo => "FlightStatusInfo",
            EventKind::FlightProcessed => "FlightProcessed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    OracleRegistered {
        indexes: [u8; 3],
    },
    AirlineRegistered {
        airline: Address,
    },
    FlightRegistered {
        flight: String,
        timestamp: u64,
    },
    OracleRequest {
        index: u8,
        airline: Address,
        flight: String,
        timestamp: u64,
    },
    OracleReport {
        index: u8,
        airline: Address,
        flight: String,
        timestamp: u64,
    },
    FlightStatusInfo {
        airline: Address,
        flight: String,
        timestamp: u64,
        status: StatusCode,
    },
    FlightProcessed {
        airline: Address,
        flight: String,
        timestamp: u64,
        status: StatusCode,
    },
}

impl LedgerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::OracleRegistered { .. } => EventKind::OracleRegistered,
            LedgerEvent::AirlineRegistered { .. } => EventKind::AirlineRegistered,
            LedgerEvent::FlightRegistered { .. } => EventKind::FlightRegistered,
            LedgerEvent::OracleRequest { .. } => EventKind::OracleRequest,
            LedgerEvent::OracleReport { .. } => EventKind::OracleReport,
            LedgerEvent::FlightStatusInfo { .. } => EventKind::FlightStatusInfo,
            LedgerEvent::FlightProcessed { .. } => EventKind::FlightProcessed,
        }
    }

    /// The status request carried by an `OracleRequest` event.
    pub fn status_request(&self) -> Option<StatusRequest> {
        match self {
            LedgerEvent::OracleRequest {
                index,
                airline,
                flight,
                timestamp,
            } => Some(StatusRequest {
                index: *index,
                airline: *airline,
                flight: flight.clone(),
                timestamp: *timestamp,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            LedgerEvent::OracleRegistered { indexes } => write!(
                f,
                "{kind}: indexes {} {} {}",
                indexes[0], indexes[1], indexes[2]
            ),
            LedgerEvent::AirlineRegistered { airline } => write!(f, "{kind}: {airline}"),
            LedgerEvent::FlightRegistered { flight, timestamp } => {
                write!(f, "{kind}: {flight} departure {timestamp}")
            }
            LedgerEvent::OracleRequest {
                index,
                airline,
                flight,
                timestamp,
            }
            | LedgerEvent::OracleReport {
                index,
                airline,
                flight,
                timestamp,
            } => write!(
                f,
                "{kind}: index {index}, airline {airline}, flight {flight}, departure {timestamp}"
            ),
            LedgerEvent::FlightStatusInfo {
                airline,
                flight,
                timestamp,
                status,
            }
            | LedgerEvent::FlightProcessed {
                airline,
                flight,
                timestamp,
                status,
            } => write!(
                f,
                "{kind}: airline {airline}, flight {flight}, departure {timestamp}, status {status}"
            ),
        }
    }
}
