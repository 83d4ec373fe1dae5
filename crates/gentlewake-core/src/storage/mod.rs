pub mod config;
pub mod database;
pub mod memory;
pub mod migrations;

pub use config::{DstCheckDay, GoobMode, Sensitivity, Settings, VibePattern};
pub use database::Database;
pub use memory::MemoryStore;

use std::path::PathBuf;

use tracing::warn;

use crate::alarm::WeeklyAlarmTable;
use crate::error::StoreError;
use crate::machine::RuntimeState;

pub const SETTINGS_KEY: &str = "settings";
pub const STATE_KEY: &str = "state";
pub const ALARMS_KEY: &str = "alarms";

/// Returns `~/.config/gentlewake[-dev]/` based on GENTLEWAKE_ENV.
///
/// Set GENTLEWAKE_ENV=dev to use the development data directory, or
/// GENTLEWAKE_HOME to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StoreError> {
    let dir = match std::env::var_os("GENTLEWAKE_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("GENTLEWAKE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("gentlewake-dev")
            } else {
                base_dir.join("gentlewake")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| StoreError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Key-value persistence for the three blobs.
///
/// Implementors supply raw get/put; the typed accessors wrap each record in a
/// versioned envelope. Reads never fail outward: a missing or unreadable
/// record yields defaults and a warning.
pub trait Store {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put_raw(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn read_settings(&self) -> Settings {
        match self.get_raw(SETTINGS_KEY) {
            Ok(Some(raw)) => migrations::decode_settings(&raw),
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!(error = %e, "settings unreadable, using defaults");
                Settings::default()
            }
        }
    }

    fn write_settings(&mut self, settings: &Settings) -> Result<(), StoreError> {
        let raw = migrations::encode(SETTINGS_KEY, migrations::SETTINGS_VERSION, settings)?;
        self.put_raw(SETTINGS_KEY, &raw)
    }

    fn read_state(&self) -> RuntimeState {
        match self.get_raw(STATE_KEY) {
            Ok(Some(raw)) => migrations::decode_state(&raw),
            Ok(None) => RuntimeState::default(),
            Err(e) => {
                warn!(error = %e, "runtime state unreadable, using defaults");
                RuntimeState::default()
            }
        }
    }

    fn write_state(&mut self, state: &RuntimeState) -> Result<(), StoreError> {
        let raw = migrations::encode(STATE_KEY, migrations::STATE_VERSION, state)?;
        self.put_raw(STATE_KEY, &raw)
    }

    fn read_alarms(&self) -> WeeklyAlarmTable {
        match self.get_raw(ALARMS_KEY) {
            Ok(Some(raw)) => migrations::decode_alarms(&raw),
            Ok(None) => WeeklyAlarmTable::default(),
            Err(e) => {
                warn!(error = %e, "alarm table unreadable, using defaults");
                WeeklyAlarmTable::default()
            }
        }
    }

    fn write_alarms(&mut self, alarms: &WeeklyAlarmTable) -> Result<(), StoreError> {
        let raw = migrations::encode(ALARMS_KEY, migrations::ALARMS_VERSION, alarms)?;
        self.put_raw(ALARMS_KEY, &raw)
    }
}
