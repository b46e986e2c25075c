// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Read-only query surface: the registry snapshot, composite flight lookups
//! answered by the ledger, and Prometheus metrics, served over HTTP/1.
//!
//! Every response carries permissive CORS headers and JSON bodies are
//! pretty-printed. Failures are `{"error": "..."}` with a status chosen by
//! [`QueryError::status`].

mod composite;
mod server;

use std::sync::Arc;

use core_types::{FlightRecord, OracleResponseInfo};
use flight_registry::FlightRegistry;
use http_body_util::Full;
use hyper::{body::Bytes, header, Method, Response, StatusCode};
use ledger_client::{LedgerClient, LedgerError};
use log::warn;
use metrics::ServiceMetrics;
use serde::Serialize;
use thiserror::Error;

pub use composite::Composite;
pub use server::serve;

pub const API_MESSAGE: &str = "An API for use with your Dapp!";
pub const ALLOW_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("{0}")]
    Malformed(String),
    #[error("{0}")]
    NotFound(String),
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("metrics unavailable: {0}")]
    Metrics(String),
}

impl QueryError {
    pub fn status(&self) -> StatusCode {
        match self {
            QueryError::Malformed(_) => StatusCode::BAD_REQUEST,
            QueryError::NotFound(_)
            | QueryError::Ledger(LedgerError::UnknownFlightKey { .. })
            | QueryError::Ledger(LedgerError::FlightNotFound { .. }) => StatusCode::NOT_FOUND,
            QueryError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            QueryError::Ledger(_) => StatusCode::BAD_GATEWAY,
            QueryError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct MessageBody<'a> {
    message: &'a str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct QuerySurface {
    registry: Arc<FlightRegistry>,
    ledger: Arc<dyn LedgerClient>,
    metrics: Option<Arc<ServiceMetrics>>,
}

impl QuerySurface {
    pub fn new(registry: Arc<FlightRegistry>, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            registry,
            ledger,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ServiceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registry contents in ascending id order.
    pub fn flight_list(&self) -> Vec<FlightRecord> {
        self.registry.snapshot()
    }

    /// Resolves a flight through the ledger: key, then id, then detail.
    pub async fn flight_by_composite(&self, composite: &Composite) -> Result<FlightRecord, QueryError> {
        let key = self
            .ledger
            .get_flight_key(composite.airline, &composite.flight, composite.timestamp)
            .await?;
        let id = self.ledger.get_flight_id_by_key(key).await?;
        Ok(self.ledger.get_flight_detail(id).await?)
    }

    /// Stored consensus response for a flight; unset slots come back zeroed.
    pub async fn response_by_composite(
        &self,
        composite: &Composite,
    ) -> Result<OracleResponseInfo, QueryError> {
        let key = self
            .ledger
            .get_flight_key(composite.airline, &composite.flight, composite.timestamp)
            .await?;
        Ok(self.ledger.oracle_responses(key).await?)
    }

    /// Routes one request. Never fails; errors become JSON error responses.
    pub async fn respond(&self, method: &Method, path: &str) -> Response<Full<Bytes>> {
        if *method == Method::OPTIONS {
            return empty(StatusCode::NO_CONTENT);
        }
        if *method != Method::GET {
            return error_response(&QueryError::MethodNotAllowed(method.to_string()));
        }
        match self.route(path).await {
            Ok(response) => response,
            Err(err) => {
                if err.status().is_server_error() {
                    warn!("query {path} failed: {err}");
                }
                error_response(&err)
            }
        }
    }

    async fn route(&self, path: &str) -> Result<Response<Full<Bytes>>, QueryError> {
        match path {
            "/api" => return Ok(json(StatusCode::OK, &MessageBody { message: API_MESSAGE })),
            "/flightList" => return Ok(json(StatusCode::OK, &self.flight_list())),
            "/metrics" => return self.render_metrics(),
            _ => {}
        }
        if let Some(segment) = path.strip_prefix("/flight/").filter(|s| !s.contains('/')) {
            let composite = Composite::from_path_segment(segment)?;
            let record = self.flight_by_composite(&composite).await?;
            return Ok(json(StatusCode::OK, &record));
        }
        if let Some(segment) = path.strip_prefix("/response/").filter(|s| !s.contains('/')) {
            let composite = Composite::from_path_segment(segment)?;
            let response = self.response_by_composite(&composite).await?;
            return Ok(json(StatusCode::OK, &response));
        }
        Err(QueryError::NotFound(format!("no route for {path}")))
    }

    fn render_metrics(&self) -> Result<Response<Full<Bytes>>, QueryError> {
        let exporter = self
            .metrics
            .as_ref()
            .ok_or_else(|| QueryError::NotFound("metrics are not enabled".to_string()))?;
        let body = exporter
            .render()
            .map_err(|err| QueryError::Metrics(err.to_string()))?;
        Ok(with_cors(Response::builder().status(StatusCode::OK))
            .header(header::CONTENT_TYPE, metrics::CONTENT_TYPE)
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| fallback()))
    }
}

fn with_cors(builder: hyper::http::response::Builder) -> hyper::http::response::Builder {
    builder
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS)
}

fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = match serde_json::to_vec_pretty(value) {
        Ok(body) => body,
        Err(err) => {
            warn!("failed to encode response body: {err}");
            return fallback();
        }
    };
    with_cors(Response::builder().status(status))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| fallback())
}

fn error_response(err: &QueryError) -> Response<Full<Bytes>> {
    json(
        err.status(),
        &ErrorBody {
            error: err.to_string(),
        },
    )
}

fn empty(status: StatusCode) -> Response<Full<Bytes>> {
    with_cors(Response::builder().status(status))
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| fallback())
}

fn fallback() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(b"{\"error\": \"bad response\"}")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
