// Copyright (c) James Kassemi, SC, US. All rights reserved.
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "flight-oracle.toml";
pub const ENV_PREFIX: &str = "FLIGHT_ORACLE";

/// Runtime knobs, read from `flight-oracle.toml` and `FLIGHT_ORACLE__*` variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    #[serde(default)]
    pub ledger_url: Option<String>,
    #[serde(default = "default_status_log_interval_s")]
    pub status_log_interval_s: u64,
    #[serde(default)]
    pub oracles: OracleConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            ledger_url: None,
            status_log_interval_s: default_status_log_interval_s(),
            oracles: OracleConfig::default(),
            dispatch: DispatchConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

fn default_http_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_status_log_interval_s() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_count")]
    pub count: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            count: default_oracle_count(),
        }
    }
}

fn default_oracle_count() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    64
}

/// Settings for the in-process ledger used in dev mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_account_pool_size")]
    pub account_pool_size: usize,
    #[serde(default = "default_min_responses")]
    pub min_responses: usize,
    #[serde(default = "default_seed_demo_flights")]
    pub seed_demo_flights: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            account_pool_size: default_account_pool_size(),
            min_responses: default_min_responses(),
            seed_demo_flights: default_seed_demo_flights(),
        }
    }
}

fn default_account_pool_size() -> usize {
    10
}

fn default_min_responses() -> usize {
    3
}

fn default_seed_demo_flights() -> bool {
    true
}

/// `FLIGHT_ORACLE__DISPATCH__QUEUE_CAPACITY=8` sets `dispatch.queue_capacity`.
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(environment())
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "dispatch.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.simulation.min_responses == 0 {
            return Err(ConfigError::Message(
                "simulation.min_responses must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
