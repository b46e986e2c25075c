// Copyright (c) James Kassemi, SC, US. All rights reserved.
mod config;
mod demo;
mod listeners;

use std::{env, process, str::FromStr, sync::Arc, time::Duration};

use crate::config::{ConfigError, Environment, RuntimeConfig};
use core_types::status::{OverallStatus, ServiceStatusSnapshot};
use flight_registry::{FlightRegistry, FlightRegistryReconciler, ReconcileError};
use ledger_client::{LedgerClient, LedgerError, SimulatedLedger, SimulatedLedgerConfig};
use listeners::{spawn_listeners, ListenerContext};
use log::{error, info, warn};
use metrics::{MetricsError, ServiceMetrics};
use oracle_registration_service::{OracleRegistrationService, RegistrationError};
use oracle_response_engine::ResponseOrchestrator;
use query_api::QuerySurface;
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(err) = run() {
        eprintln!("flight-oracle failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    init_logging();
    let config = {
        let env = parse_environment()?;
        RuntimeConfig::load(env)?
    };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;
    runtime.block_on(run_service(config))
}

/// `log` records are bridged into the subscriber; `RUST_LOG` overrides the `info` default.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn parse_environment() -> Result<Environment, AppError> {
    let arg = env::args().nth(1).ok_or(AppError::Usage)?;
    Environment::from_str(&arg).map_err(AppError::from)
}

async fn run_service(config: RuntimeConfig) -> Result<(), AppError> {
    let app = &config.app;
    info!(
        "flight-oracle booting in {} mode; {} oracles from a pool of {}",
        config.env_label(),
        app.oracles.count,
        app.simulation.account_pool_size
    );
    let simulated = Arc::new(SimulatedLedger::new(SimulatedLedgerConfig {
        account_pool_size: app.simulation.account_pool_size,
        min_responses: app.simulation.min_responses,
        ..SimulatedLedgerConfig::default()
    }));
    let ledger: Arc<dyn LedgerClient> = simulated.clone();
    if !ledger.is_operational().await? {
        warn!("ledger reports it is not operational; writes will be rejected");
    }

    let registration = OracleRegistrationService::new(Arc::clone(&ledger));
    let report = registration.register(app.oracles.count).await?;
    let oracles = report.oracle_set();
    info!(
        "{} oracles active, {} dropped",
        oracles.len(),
        report.dropped().count()
    );

    let orchestrator = Arc::new(ResponseOrchestrator::new(Arc::clone(&ledger), oracles));
    let registry = Arc::new(FlightRegistry::new());
    let reconciler = Arc::new(FlightRegistryReconciler::new(
        Arc::clone(&ledger),
        Arc::clone(&registry),
    ));

    let metrics = Arc::new(ServiceMetrics::new(orchestrator.metrics(), Arc::clone(&registry))?);
    metrics.register_service_status(registration.status_handle());
    metrics.register_service_status(orchestrator.status_handle());
    metrics.register_service_status(reconciler.status_handle());

    let (dispatch, dispatcher) = Arc::clone(&orchestrator).spawn(app.dispatch.queue_capacity);
    let listeners = spawn_listeners(
        ledger.as_ref(),
        ListenerContext {
            dispatch,
            reconciler: Arc::clone(&reconciler),
        },
    );

    if app.simulation.seed_demo_flights {
        demo::seed(&simulated)?;
    }
    let flights = reconciler.resync().await?;
    info!("registry holds {flights} flights after initial resync");

    let status_logger = spawn_status_logger(
        Arc::clone(&metrics),
        Duration::from_secs(app.status_log_interval_s.max(1)),
    );

    let listener = TcpListener::bind(config.http_addr)
        .await
        .map_err(|source| AppError::Bind {
            addr: config.http_addr.to_string(),
            source,
        })?;
    let surface = Arc::new(QuerySurface::new(registry, Arc::clone(&ledger)).with_metrics(metrics));
    query_api::serve(surface, listener, shutdown_signal()).await;

    status_logger.abort();
    for handle in listeners {
        handle.abort();
    }
    dispatcher.abort();
    info!("flight-oracle stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => error!("failed to listen for shutdown signal: {err}"),
    }
}

fn spawn_status_logger(metrics: Arc<ServiceMetrics>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for snapshot in metrics.service_status_snapshots() {
                log_snapshot(&snapshot);
            }
        }
    })
}

fn log_snapshot(snapshot: &ServiceStatusSnapshot) {
    let gauges = snapshot
        .gauges
        .iter()
        .map(|g| match &g.unit {
            Some(unit) => format!("{}={} {unit}", g.label, g.value),
            None => format!("{}={}", g.label, g.value),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let line = format!("{} {:?}: {gauges}", snapshot.name, snapshot.overall);
    match snapshot.overall {
        OverallStatus::Ok => info!("{line}"),
        OverallStatus::Warn => warn!("{line}; warnings: {:?}", snapshot.warnings),
        OverallStatus::Crit => error!("{line}; errors: {:?}", snapshot.errors),
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: flight-oracle <dev|prod>")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start runtime: {0}")]
    Runtime(std::io::Error),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
