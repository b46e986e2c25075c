// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Response orchestration: each ledger status request is answered by every
//! active oracle holding the request's index, all reporting one shared status.
//!
//! Requests arrive through a bounded [`DispatchQueue`]. A dispatcher task drains
//! the queue and handles each request on its own task; each submission in turn
//! runs as an independent task so a slow or failing oracle never holds up the
//! others. Outcomes are counted for observability only and nothing is retried.

pub mod metrics;
mod source;

use std::{fmt, sync::Arc};

use core_types::{
    status::{OverallStatus, ServiceStatusHandle, StatusGauge},
    Address, OracleSet, StatusCode, StatusRequest,
};
use ledger_client::{LedgerClient, LedgerError};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::{JoinHandle, JoinSet},
};

pub use metrics::{DispatchMetrics, DispatchMetricsSnapshot};
pub use source::{FixedStatusSource, RandomStatusSource, StatusSource};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    IndexNotAssigned,
    RequestClosed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::IndexNotAssigned => f.write_str("index not assigned"),
            SkipReason::RequestClosed => f.write_str("request closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Submitted { oracle: Address },
    Skipped { oracle: Address, reason: SkipReason },
    Failed { oracle: Address, cause: LedgerError },
}

impl DispatchOutcome {
    pub fn oracle(&self) -> Address {
        match self {
            DispatchOutcome::Submitted { oracle }
            | DispatchOutcome::Skipped { oracle, .. }
            | DispatchOutcome::Failed { oracle, .. } => *oracle,
        }
    }

    fn from_submission(oracle: Address, result: Result<(), LedgerError>) -> Self {
        match result {
            Ok(()) => DispatchOutcome::Submitted { oracle },
            Err(LedgerError::RequestClosed { .. }) => DispatchOutcome::Skipped {
                oracle,
                reason: SkipReason::RequestClosed,
            },
            Err(cause) => DispatchOutcome::Failed { oracle, cause },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestPhase {
    Received,
    Dispatching,
    Done,
}

impl RequestPhase {
    fn advance(self) -> Self {
        match self {
            RequestPhase::Received => RequestPhase::Dispatching,
            RequestPhase::Dispatching | RequestPhase::Done => RequestPhase::Done,
        }
    }
}

/// Per-request aggregate of submission outcomes.
#[derive(Debug, Clone)]
pub struct DispatchSummary {
    pub request: StatusRequest,
    pub status: StatusCode,
    pub phase: RequestPhase,
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchSummary {
    fn new(request: StatusRequest, status: StatusCode) -> Self {
        Self {
            request,
            status,
            phase: RequestPhase::Received,
            outcomes: Vec::new(),
        }
    }

    fn advance(&mut self) {
        let next = self.phase.advance();
        debug!(
            "request index {} flight {}: {:?} -> {:?}",
            self.request.index, self.request.flight, self.phase, next
        );
        self.phase = next;
    }

    pub fn submitted(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Submitted { .. }))
    }

    pub fn skipped(&self, reason: SkipReason) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Skipped { reason: r, .. } if *r == reason))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, DispatchOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&DispatchOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|&o| pred(o)).count()
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch queue is closed")]
    QueueClosed,
}

/// Sending half of the bounded request queue.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<StatusRequest>,
}

impl DispatchQueue {
    /// Waits for queue space when the dispatcher is behind; never drops.
    pub async fn enqueue(&self, request: StatusRequest) -> Result<(), DispatchError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| DispatchError::QueueClosed)
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

pub struct ResponseOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    oracles: Arc<OracleSet>,
    statuses: Arc<dyn StatusSource>,
    metrics: DispatchMetrics,
    status: ServiceStatusHandle,
}

impl ResponseOrchestrator {
    pub fn new(ledger: Arc<dyn LedgerClient>, oracles: OracleSet) -> Self {
        let status = ServiceStatusHandle::new("oracle_response");
        status.set_gauge(StatusGauge::new("active_oracles", oracles.len() as f64).with_unit("oracles"));
        if oracles.is_empty() {
            status.push_warning("no active oracles; requests will go unanswered");
        } else {
            status.set_overall(OverallStatus::Ok);
        }
        Self {
            ledger,
            oracles: Arc::new(oracles),
            statuses: Arc::new(RandomStatusSource),
            metrics: DispatchMetrics::new(),
            status,
        }
    }

    pub fn with_status_source(mut self, statuses: Arc<dyn StatusSource>) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn oracles(&self) -> &OracleSet {
        &self.oracles
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.metrics.clone()
    }

    pub fn status_handle(&self) -> ServiceStatusHandle {
        self.status.clone()
    }

    /// Answers one request and waits for every submission to settle.
    pub async fn handle_request(&self, request: StatusRequest) -> DispatchSummary {
        self.metrics.request_started();
        let status = self.statuses.draw();
        let mut summary = DispatchSummary::new(request, status);
        info!(
            "answering request index {} for flight {} ({}) with status {}",
            summary.request.index, summary.request.flight, summary.request.timestamp, status
        );
        summary.advance();

        let request = Arc::new(summary.request.clone());
        let mut tasks = JoinSet::new();
        for oracle in self.oracles.iter() {
            if !oracle.indexes.contains(request.index) {
                let outcome = DispatchOutcome::Skipped {
                    oracle: oracle.identity,
                    reason: SkipReason::IndexNotAssigned,
                };
                debug!("oracle {} skipped: {}", oracle.identity, SkipReason::IndexNotAssigned);
                self.metrics.record(&outcome);
                summary.outcomes.push(outcome);
                continue;
            }
            let ledger = Arc::clone(&self.ledger);
            let request = Arc::clone(&request);
            let identity = oracle.identity;
            tasks.spawn(async move {
                let result = ledger
                    .submit_oracle_response(identity, &request, status)
                    .await;
                DispatchOutcome::from_submission(identity, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    match &outcome {
                        DispatchOutcome::Submitted { oracle } => {
                            debug!("oracle {oracle} submitted status {status}")
                        }
                        DispatchOutcome::Skipped { oracle, reason } => {
                            debug!("oracle {oracle} skipped: {reason}")
                        }
                        DispatchOutcome::Failed { oracle, cause } => {
                            warn!("oracle {oracle} failed to submit response: {cause}")
                        }
                    }
                    self.metrics.record(&outcome);
                    summary.outcomes.push(outcome);
                }
                Err(err) => error!("oracle submission task failed: {err}"),
            }
        }

        summary.advance();
        self.metrics.request_finished();
        self.publish_status();
        summary
    }

    fn publish_status(&self) {
        let snapshot = self.metrics.snapshot();
        self.status
            .set_gauge(StatusGauge::new("requests_handled", snapshot.requests as f64));
        self.status
            .set_gauge(StatusGauge::new("submissions", snapshot.submitted as f64));
        self.status
            .set_gauge(StatusGauge::new("failed_submissions", snapshot.failed as f64));
    }

    /// Starts the dispatcher behind a bounded queue of `capacity` requests.
    pub fn spawn(self: Arc<Self>, capacity: usize) -> (DispatchQueue, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<StatusRequest>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let orchestrator = Arc::clone(&self);
                tokio::spawn(async move {
                    let summary = orchestrator.handle_request(request).await;
                    debug!(
                        "request index {} done: {} submitted, {} failed",
                        summary.request.index,
                        summary.submitted(),
                        summary.failed()
                    );
                });
            }
            info!("dispatch queue closed; dispatcher exiting");
        });
        (DispatchQueue { tx }, handle)
    }
}
