// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{sync::Arc, time::Duration};

use core_types::{EventKind, OracleIndexes, StatusCode, StatusRequest};
use ledger_client::{LedgerClient, SimulatedLedger};
use oracle_registration_service::OracleRegistrationService;
use oracle_response_engine::{ResponseOrchestrator, SkipReason};

/// Registers the three highest pool accounts with pinned index triples.
async fn three_oracles(triples: [[u8; 3]; 3]) -> (Arc<SimulatedLedger>, ResponseOrchestrator) {
    let ledger = Arc::new(SimulatedLedger::default());
    for (slot, triple) in (7..10).zip(triples) {
        let account = ledger.account(slot).unwrap();
        ledger.force_indexes(account, OracleIndexes::new(triple).unwrap());
    }
    let registration = OracleRegistrationService::new(ledger.clone());
    let report = registration.register(3).await.unwrap();
    assert_eq!(report.oracle_set().len(), 3);
    let orchestrator = ResponseOrchestrator::new(ledger.clone(), report.oracle_set());
    (ledger, orchestrator)
}

fn request(ledger: &SimulatedLedger, index: u8) -> StatusRequest {
    StatusRequest {
        index,
        airline: ledger.owner(),
        flight: "F1".to_string(),
        timestamp: 1000,
    }
}

#[tokio::test]
async fn index_held_by_one_oracle_yields_one_submission() {
    let (ledger, orchestrator) = three_oracles([[0, 1, 2], [3, 4, 5], [6, 7, 8]]).await;
    let owner = ledger.owner();
    ledger.register_flight(owner, "F1", 1000).unwrap();
    ledger.open_status_request(owner, owner, "F1", 1000, 4).unwrap();

    let summary = orchestrator.handle_request(request(&ledger, 4)).await;

    assert_eq!(summary.submitted(), 1);
    assert_eq!(summary.skipped(SkipReason::IndexNotAssigned), 2);
    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].oracle, ledger.account(8).unwrap());
    assert!(submissions[0].accepted);
}

#[tokio::test]
async fn index_held_by_no_oracle_yields_no_submission() {
    let (ledger, orchestrator) = three_oracles([[0, 1, 2], [3, 4, 5], [6, 7, 8]]).await;
    let owner = ledger.owner();
    ledger.open_status_request(owner, owner, "F1", 1000, 9).unwrap();

    let summary = orchestrator.handle_request(request(&ledger, 9)).await;

    assert_eq!(summary.submitted(), 0);
    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.skipped(SkipReason::IndexNotAssigned), 3);
    assert!(ledger.submissions().is_empty());
}

#[tokio::test]
async fn every_submission_for_a_request_carries_one_status() {
    let (ledger, orchestrator) = three_oracles([[1, 2, 3], [2, 4, 6], [0, 2, 9]]).await;
    let owner = ledger.owner();
    ledger.register_flight(owner, "F1", 1000).unwrap();
    ledger.open_status_request(owner, owner, "F1", 1000, 2).unwrap();

    let summary = orchestrator.handle_request(request(&ledger, 2)).await;

    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 3);
    assert!(submissions.iter().all(|s| s.status == summary.status));
    assert_ne!(summary.status, StatusCode::Unknown);
    let key = ledger.get_flight_key(owner, "F1", 1000).await.unwrap();
    let response = ledger.oracle_responses(key).await.unwrap();
    assert!(!response.is_open);
    assert_eq!(response.status_code, summary.status);
}

#[tokio::test]
async fn queued_requests_reach_consensus() {
    let (ledger, orchestrator) = three_oracles([[5, 6, 7], [5, 8, 9], [0, 1, 5]]).await;
    let owner = ledger.owner();
    ledger.register_flight(owner, "F1", 1000).unwrap();
    ledger.open_status_request(owner, owner, "F1", 1000, 5).unwrap();
    let mut events = ledger.subscribe();

    let (queue, dispatcher) = Arc::new(orchestrator).spawn(1);
    assert_eq!(queue.capacity(), 1);
    queue.enqueue(request(&ledger, 5)).await.unwrap();

    let processed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if event.kind() == EventKind::FlightProcessed => break event,
                Ok(_) => continue,
                Err(err) => panic!("event stream ended: {err}"),
            }
        }
    })
    .await
    .expect("flight processed before timeout");
    assert_eq!(processed.kind(), EventKind::FlightProcessed);

    drop(queue);
    dispatcher.await.unwrap();
}
