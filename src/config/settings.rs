//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use serde::{Deserialize, Serialize};
use chrono::Duration;
use crate::utils::errors::EventGateError;
use crate::utils::helpers::MAX_CHECK_IN_CODE_LENGTH;

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_acquire_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: String,
    pub file_prefix: String,
    pub json: bool,
}

/// Business rules of the registration engine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Check-in opens this many hours before the event
    pub check_in_window_hours: i64,
    /// Attendees cannot cancel themselves inside this many hours of the event
    pub cancellation_cutoff_hours: i64,
    pub check_in_code_length: usize,
    pub check_in_code_attempts: u32,
    pub max_registration_batch: usize,
    pub max_event_batch: usize,
    pub max_user_batch: usize,
}

impl RegistrationConfig {
    pub fn check_in_window(&self) -> Duration {
        Duration::hours(self.check_in_window_hours)
    }

    pub fn cancellation_cutoff(&self) -> Duration {
        Duration::hours(self.cancellation_cutoff_hours)
    }

    /// Bounds the engine relies on to produce usable codes and batches
    pub fn validate(&self) -> Result<(), EventGateError> {
        if self.check_in_window_hours <= 0 {
            return Err(EventGateError::Config(
                "Check-in window must be at least one hour".to_string()
            ));
        }

        if self.cancellation_cutoff_hours < 0 {
            return Err(EventGateError::Config(
                "Cancellation cutoff cannot be negative".to_string()
            ));
        }

        if !(1..=MAX_CHECK_IN_CODE_LENGTH).contains(&self.check_in_code_length) {
            return Err(EventGateError::Config(format!(
                "Check-in code length must be between 1 and {}, got {}",
                MAX_CHECK_IN_CODE_LENGTH, self.check_in_code_length
            )));
        }

        if self.check_in_code_attempts == 0 {
            return Err(EventGateError::Config(
                "At least one check-in code attempt is required".to_string()
            ));
        }

        if self.max_registration_batch == 0 || self.max_event_batch == 0 || self.max_user_batch == 0 {
            return Err(EventGateError::Config(
                "Batch limits must be greater than 0".to_string()
            ));
        }

        Ok(())
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            check_in_window_hours: 24,
            cancellation_cutoff_hours: 24,
            check_in_code_length: 6,
            check_in_code_attempts: 5,
            max_registration_batch: 100,
            max_event_batch: 50,
            max_user_batch: 50,
        }
    }
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::from_file("config")
    }

    /// Load settings from the given file (extension optional) layered under the environment
    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let settings = config::Config::builder()
            .set_default("database.url", defaults.database.url)?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default("database.min_connections", defaults.database.min_connections)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.directory", defaults.logging.directory)?
            .set_default("logging.file_prefix", defaults.logging.file_prefix)?
            .set_default("logging.json", defaults.logging.json)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("EVENTGATE").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), EventGateError> {
        super::validation::validate_settings(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/eventgate".to_string(),
                max_connections: 10,
                min_connections: 1,
                acquire_timeout_seconds: default_acquire_timeout(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                directory: "logs".to_string(),
                file_prefix: "eventgate.log".to_string(),
                json: false,
            },
            registration: RegistrationConfig::default(),
        }
    }
}
