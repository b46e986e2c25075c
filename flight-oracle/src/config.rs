// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{net::SocketAddr, str::FromStr};

use core_types::config::AppConfig;
use thiserror::Error;

/// Deployment target for the binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}

/// Loaded settings plus the values derived from them at startup.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub env: Environment,
    pub http_addr: SocketAddr,
    pub app: AppConfig,
}

impl RuntimeConfig {
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        Self::from_app(env, AppConfig::load()?)
    }

    fn from_app(env: Environment, app: AppConfig) -> Result<Self, ConfigError> {
        if env == Environment::Prod {
            // Only the in-process ledger ships with this binary.
            return Err(match &app.ledger_url {
                None => ConfigError::MissingLedgerUrl,
                Some(url) => ConfigError::RemoteLedgerUnavailable { url: url.clone() },
            });
        }
        let http_addr = app
            .http_addr
            .parse()
            .map_err(|_| ConfigError::InvalidHttpAddr {
                value: app.http_addr.clone(),
            })?;
        Ok(Self {
            env,
            http_addr,
            app,
        })
    }

    pub fn env_label(&self) -> &'static str {
        match self.env {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown environment '{value}' (expected 'dev' or 'prod')")]
    UnknownEnvironment { value: String },
    #[error("failed to load settings: {0}")]
    Settings(#[from] ::config::ConfigError),
    #[error("invalid http_addr '{value}'")]
    InvalidHttpAddr { value: String },
    #[error("prod requires ledger_url to be set")]
    MissingLedgerUrl,
    #[error("no ledger client is available for {url}; run with 'dev' for the simulated ledger")]
    RemoteLedgerUnavailable { url: String },
}
