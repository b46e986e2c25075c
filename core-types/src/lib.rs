// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared domain types, ledger events, configuration and service status for the flight oracle service.

pub mod config;
pub mod events;
pub mod status;
pub mod types;

pub use events::{EventKind, LedgerEvent};
pub use types::{
    Address, FlightKey, FlightRecord, IndexError, Oracle, OracleIndexes, OracleResponseInfo,
    OracleSet, ParseHexError, StatusCode, StatusRequest, Wei, MAX_ORACLE_INDEX, WEI_PER_ETHER,
};
