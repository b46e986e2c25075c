// Copyright (c) James Kassemi, SC, US. All rights reserved.
use core_types::LedgerEvent;
use log::debug;
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Fan-out of ledger events to every subscribed listener.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: LedgerEvent) {
        // No receivers yet is not an error; the event is simply unobserved.
        if self.tx.send(event).is_err() {
            debug!("ledger event emitted with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
