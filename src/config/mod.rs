//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `BILLING_CORE` prefix
//! and `__` between nesting levels. Every field has a default.
//!
//! # Example
//!
//! ```no_run
//! use billing_core::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Grace period: {} days", config.billing.grace_period_days);
//! ```

mod billing;
mod error;
mod logging;

pub use billing::BillingConfig;
pub use error::{ConfigError, ConfigValidationError};
pub use logging::{LogFormat, LoggingConfig};

use serde::Deserialize;
use std::collections::HashMap;

const ENV_PREFIX: &str = "BILLING_CORE";

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    /// Dunning, batching and pricing policies
    #[serde(default)]
    pub billing: BillingConfig,

    /// Tracing subscriber settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `BILLING_CORE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING_CORE__BILLING__GRACE_PERIOD_DAYS=7` -> `billing.grace_period_days = 7`
    /// - `BILLING_CORE__BILLING__RETRY_INTERVALS=1,3,5` -> `billing.retry_intervals = [1, 3, 5]`
    /// - `BILLING_CORE__LOGGING__FORMAT=json` -> `logging.format = json`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();
        Self::load_from(None)
    }

    /// Load from an explicit variable map instead of the process environment.
    pub fn load_from_map(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load_from(Some(vars))
    }

    fn load_from(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.billing.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
