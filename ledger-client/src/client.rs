// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! LedgerClient trait: the only way the service talks to the contract pair.

use core_types::{
    Address, FlightKey, FlightRecord, LedgerEvent, OracleResponseInfo, StatusCode, StatusRequest,
    Wei,
};
use thiserror::Error;
use tokio::sync::broadcast;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("contract is not operational")]
    NotOperational,
    #[error("account {account} is not known to the ledger")]
    UnknownAccount { account: Address },
    #[error("oracle {oracle} is already registered")]
    AlreadyRegistered { oracle: Address },
    #[error("registration fee {offered} below required {required}")]
    InsufficientFee { required: Wei, offered: Wei },
    #[error("oracle {oracle} is not registered")]
    NotRegistered { oracle: Address },
    #[error("index {index} does not match an assignment or open request")]
    IndexMismatch { index: u8 },
    #[error("request for flight key {key} is no longer open")]
    RequestClosed { key: FlightKey },
    #[error("flight {id} not found")]
    FlightNotFound { id: u64 },
    #[error("no flight registered under key {key}")]
    UnknownFlightKey { key: FlightKey },
    #[error("call reverted: {reason}")]
    Reverted { reason: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl LedgerError {
    pub fn reverted(reason: impl Into<String>) -> Self {
        LedgerError::Reverted {
            reason: reason.into(),
        }
    }
}

/// Remote calls and event subscription over the application and data contracts.
///
/// Implementations are shared as `Arc<dyn LedgerClient>` and injected into each
/// component at construction.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fixed pool of accounts the service may act as.
    async fn accounts(&self) -> LedgerResult<Vec<Address>>;

    async fn is_operational(&self) -> LedgerResult<bool>;

    async fn registration_fee(&self) -> LedgerResult<Wei>;

    async fn register_oracle(&self, from: Address, fee: Wei) -> LedgerResult<()>;

    async fn get_my_indexes(&self, from: Address) -> LedgerResult<[u8; 3]>;

    async fn submit_oracle_response(
        &self,
        from: Address,
        request: &StatusRequest,
        status: StatusCode,
    ) -> LedgerResult<()>;

    async fn total_flight(&self) -> LedgerResult<u64>;

    async fn get_flight_detail(&self, id: u64) -> LedgerResult<FlightRecord>;

    async fn get_flight_key(
        &self,
        airline: Address,
        flight: &str,
        timestamp: u64,
    ) -> LedgerResult<FlightKey>;

    async fn get_flight_id_by_key(&self, key: FlightKey) -> LedgerResult<u64>;

    async fn oracle_responses(&self, key: FlightKey) -> LedgerResult<OracleResponseInfo>;

    /// New receiver over every event emitted from now on.
    fn subscribe(&self) -> broadcast::Receiver<LedgerEvent>;
}
