// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Ledger boundary for the flight oracle service.
//!
//! The crate exposes:
//! - [`LedgerClient`]: async remote-call and event-subscription trait over the contract pair.
//! - [`EventBus`]: broadcast fan-out used by ledger backends to deliver [`core_types::LedgerEvent`]s.
//! - [`SimulatedLedger`]: in-process backend for dev mode and tests.

pub mod bus;
pub mod client;
pub mod simulated;

pub use bus::EventBus;
pub use client::{LedgerClient, LedgerError, LedgerResult};
pub use simulated::{
    derive_flight_key, SimulatedLedger, SimulatedLedgerConfig, SubmissionRecord,
};
