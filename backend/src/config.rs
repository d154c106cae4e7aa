//! Configuration management for the Kitcast server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with KITCAST_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::{RiskPolicy, DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub jwt: JwtConfig,

    /// Forecast horizon limits and risk weighting
    #[serde(default)]
    pub forecast: ForecastConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret shared with the token issuer
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ForecastConfig {
    /// Horizon used when a request does not name one
    pub default_horizon_days: i32,

    /// Requests asking for more are clamped down to this
    pub max_horizon_days: i32,

    pub risk: RiskPolicy,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            default_horizon_days: DEFAULT_HORIZON_DAYS,
            max_horizon_days: MAX_HORIZON_DAYS,
            risk: RiskPolicy::default(),
        }
    }
}

impl ForecastConfig {
    /// Resolve a requested horizon against the configured default and cap
    pub fn horizon(&self, requested: Option<i64>) -> i32 {
        shared::clamp_horizon(requested, self.default_horizon_days, self.max_horizon_days)
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("KITCAST_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("forecast.default_horizon_days", DEFAULT_HORIZON_DAYS)?
            .set_default("forecast.max_horizon_days", MAX_HORIZON_DAYS)?
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (KITCAST_ prefix)
            .add_source(
                Environment::with_prefix("KITCAST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
