// Copyright (c) James Kassemi, SC, US. All rights reserved.
use ledger_client::{LedgerResult, SimulatedLedger};
use log::info;

/// Departure times are epoch milliseconds.
const DEMO_FLIGHTS: &[(&str, u64)] = &[
    ("ND1309", 1_767_225_600_000),
    ("ND1310", 1_767_243_600_000),
    ("ND2001", 1_767_312_000_000),
];

/// Seeds a second airline, a few flights and one open status request.
pub fn seed(ledger: &SimulatedLedger) -> LedgerResult<()> {
    let owner = ledger.owner();
    if let Some(partner) = ledger.account(1) {
        ledger.register_airline(owner, partner)?;
        ledger.register_flight(partner, "PA0042", 1_767_229_200_000)?;
    }
    for (flight, departure) in DEMO_FLIGHTS {
        ledger.register_flight(owner, flight, *departure)?;
    }
    let (flight, departure) = DEMO_FLIGHTS[0];
    let index = ledger.fetch_flight_status(owner, owner, flight, departure)?;
    info!("demo data seeded; status request for {flight} opened under index {index}");
    Ok(())
}
