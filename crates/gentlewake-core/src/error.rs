//! Core error types for gentlewake-core.
//!
//! This module defines the error hierarchy using thiserror. Scheduling
//! errors are the only ones that surface to the wearer; storage and config
//! errors fall back to defaults wherever a missed alarm would otherwise
//! result.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::WakeReason;

/// Core error type for gentlewake-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persistence-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Wake-up scheduling errors
    #[error("Scheduling error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Accelerometer errors
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// Scenario file errors
    #[error("Scenario error: {0}")]
    Scenario(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistent store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the database file
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The database is locked by another process
    #[error("Store is locked")]
    Locked,

    /// A blob could not be encoded
    #[error("Failed to encode '{key}': {message}")]
    Encode { key: String, message: String },

    /// The data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Settings errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown settings key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse settings: {0}")]
    ParseFailed(String),
}

/// Wake-up scheduling errors reported by the OS primitive or by the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleError {
    /// Another application already owns a wake within a minute of `at`
    #[error("Another wake-up is already scheduled near {at}")]
    RangeConflict { at: DateTime<Utc> },

    /// Any other failure of the wake primitive
    #[error("Wake-up scheduling failed with code {code}")]
    Unknown { code: i32 },

    /// Every shifted retry collided
    #[error("Could not schedule {reason:?} wake-up near {at}: all retries collided")]
    Exhausted { at: DateTime<Utc>, reason: WakeReason },
}

/// Accelerometer errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// The accelerometer service refused the subscription
    #[error("Accelerometer subscription failed: {0}")]
    SubscribeFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Hour outside 0..=23
    #[error("Invalid hour {0}: must be 0-23")]
    Hour(u8),

    /// Minute outside 0..=59
    #[error("Invalid minute {0}: must be 0-59")]
    Minute(u8),

    /// Weekday index outside 0..=6
    #[error("Invalid weekday index {0}: must be 0 (Sunday) to 6 (Saturday)")]
    Weekday(usize),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) if e.code == rusqlite::ErrorCode::DatabaseBusy => {
                StoreError::Locked
            }
            rusqlite::Error::SqliteFailure(e, _msg) if e.code == rusqlite::ErrorCode::DatabaseLocked => {
                StoreError::Locked
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::Scenario(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
