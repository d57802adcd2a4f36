//! Configuration module
//!
//! Loads configuration from environment variables. The transfer policy is
//! read and validated here; a malformed policy fails startup.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::db::SYSTEM_OPERATOR_ACCOUNT_ID;
use crate::domain::Percentage;
use crate::policy::{Policy, PolicyError};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// SHA-256 hashes of accepted API keys
    pub api_key_hashes: Vec<String>,

    /// Interval between runs of the code expiry job
    pub expiry_job_interval: Duration,

    /// Bounded wait for per-account locks
    pub lock_wait: Duration,

    pub policy: Policy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let database_max_connections = parse(&var("DATABASE_MAX_CONNECTIONS", "10"), "DATABASE_MAX_CONNECTIONS")?;

        let host = var("HOST", "127.0.0.1");

        let port = parse(&var("PORT", "3000"), "PORT")?;

        let environment = var("ENVIRONMENT", "development");

        let api_key_hashes = var("API_KEY_HASHES", "")
            .split(',')
            .map(|hash| hash.trim().to_lowercase())
            .filter(|hash| !hash.is_empty())
            .collect::<Vec<_>>();
        if api_key_hashes
            .iter()
            .any(|hash| hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(ConfigError::InvalidValue("API_KEY_HASHES"));
        }

        let expiry_job_interval = Duration::from_secs(parse(
            &var("EXPIRY_JOB_INTERVAL_SECS", "60"),
            "EXPIRY_JOB_INTERVAL_SECS",
        )?);
        if expiry_job_interval.is_zero() {
            return Err(ConfigError::InvalidValue("EXPIRY_JOB_INTERVAL_SECS"));
        }

        let lock_wait = Duration::from_millis(parse(&var("LOCK_WAIT_MS", "5000"), "LOCK_WAIT_MS")?);
        if lock_wait.is_zero() {
            return Err(ConfigError::InvalidValue("LOCK_WAIT_MS"));
        }

        let policy = Policy::new(
            parse(&var("POLICY_DAILY_CEILING", "5000000.00"), "POLICY_DAILY_CEILING")?,
            parse(&var("POLICY_DAILY_THRESHOLD", "2000000.00"), "POLICY_DAILY_THRESHOLD")?,
            percentage(&var("POLICY_OPERATOR_PART", "50"), "POLICY_OPERATOR_PART")?,
            percentage(&var("POLICY_EXPEDITOR_PART", "25"), "POLICY_EXPEDITOR_PART")?,
            percentage(&var("POLICY_PAYER_PART", "25"), "POLICY_PAYER_PART")?,
            percentage(&var("POLICY_COMMISSION_RATE", "5"), "POLICY_COMMISSION_RATE")?,
            parse(&var("POLICY_CODE_VALIDITY_HOURS", "72"), "POLICY_CODE_VALIDITY_HOURS")?,
            match lookup("POLICY_OPERATOR_ACCOUNT_ID") {
                Some(id) => parse::<Uuid>(&id, "POLICY_OPERATOR_ACCOUNT_ID")?,
                None => SYSTEM_OPERATOR_ACCOUNT_ID,
            },
        )?;

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            api_key_hashes,
            expiry_job_interval,
            lock_wait,
            policy,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse<T: FromStr>(value: &str, key: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue(key))
}

fn percentage(value: &str, key: &'static str) -> Result<Percentage, ConfigError> {
    let value: Decimal = parse(value, key)?;
    Percentage::new(value).map_err(|_| ConfigError::InvalidValue(key))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),

    #[error("Invalid policy: {0}")]
    Policy(#[from] PolicyError),
}
