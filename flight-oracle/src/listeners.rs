// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::sync::Arc;

use core_types::{EventKind, LedgerEvent};
use flight_registry::FlightRegistryReconciler;
use ledger_client::LedgerClient;
use log::{info, warn};
use oracle_response_engine::DispatchQueue;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};

/// What event handlers need to act on a delivery.
#[derive(Clone)]
pub struct ListenerContext {
    pub dispatch: DispatchQueue,
    pub reconciler: Arc<FlightRegistryReconciler>,
}

/// One listener task per event kind, each on its own subscription.
pub fn spawn_listeners(ledger: &dyn LedgerClient, ctx: ListenerContext) -> Vec<JoinHandle<()>> {
    EventKind::ALL
        .iter()
        .map(|&kind| tokio::spawn(listen(kind, ledger.subscribe(), ctx.clone())))
        .collect()
}

async fn listen(
    kind: EventKind,
    mut events: tokio::sync::broadcast::Receiver<LedgerEvent>,
    ctx: ListenerContext,
) {
    loop {
        match events.recv().await {
            Ok(event) if event.kind() == kind => handle(event, &ctx).await,
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                warn!("{kind} listener lagged; {missed} events missed");
                if matches!(kind, EventKind::FlightRegistered | EventKind::FlightProcessed) {
                    spawn_resync(Arc::clone(&ctx.reconciler));
                }
            }
            Err(RecvError::Closed) => {
                info!("{kind} listener stopped: event stream closed");
                break;
            }
        }
    }
}

/// Missed registry events can only be recovered by rebuilding from the ledger.
fn spawn_resync(reconciler: Arc<FlightRegistryReconciler>) {
    tokio::spawn(async move {
        if let Err(err) = reconciler.resync().await {
            warn!("recovery resync failed: {err}");
        }
    });
}

async fn handle(event: LedgerEvent, ctx: &ListenerContext) {
    info!("{event}");
    match event.kind() {
        EventKind::OracleRequest => {
            if let Some(request) = event.status_request() {
                // Awaiting queue space is the back-pressure on this listener.
                if let Err(err) = ctx.dispatch.enqueue(request).await {
                    warn!("status request not dispatched: {err}");
                }
            }
        }
        EventKind::FlightRegistered | EventKind::FlightProcessed => {
            let reconciler = Arc::clone(&ctx.reconciler);
            tokio::spawn(async move {
                if let Err(err) = reconciler.handle_event(&event).await {
                    warn!("registry update for {} failed: {err}", event.kind());
                }
            });
        }
        EventKind::OracleRegistered
        | EventKind::AirlineRegistered
        | EventKind::OracleReport
        | EventKind::FlightStatusInfo => {}
    }
}
