//! Versioned blob encoding and upgrades.
//!
//! Every record is stored as `{"version": N, "data": {...}}`. Reading walks
//! an old blob forward one version at a time, then decodes it field by field
//! so a single bad value costs only that field.
//!
//! Settings history:
//! - v1: `dst_check_day` was a 1-based weekday number (0 = off); no GooB fields.
//! - v2: `dst_check_day` is a day name or null; `monitor_period = 0` meant "default".
//! - v3: `monitor_period` is always explicit.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::alarm::WeeklyAlarmTable;
use crate::error::StoreError;
use crate::machine::RuntimeState;

use super::config::{DstCheckDay, Settings};

pub const SETTINGS_VERSION: u32 = 3;
pub const STATE_VERSION: u32 = 1;
pub const ALARMS_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub data: Value,
}

pub fn encode<T: Serialize>(key: &str, version: u32, value: &T) -> Result<String, StoreError> {
    let data = serde_json::to_value(value).map_err(|e| StoreError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    serde_json::to_string(&Envelope { version, data }).map_err(|e| StoreError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Splits a raw record into version and payload. A bare object without an
/// envelope predates versioning and counts as v1.
fn open_envelope(key: &str, raw: &str) -> Option<Envelope> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(key, error = %e, "record is not valid JSON, using defaults");
            return None;
        }
    };
    match serde_json::from_value::<Envelope>(value.clone()) {
        Ok(envelope) => Some(envelope),
        Err(_) if value.is_object() => Some(Envelope {
            version: 1,
            data: value,
        }),
        Err(_) => {
            warn!(key, "record has an unexpected shape, using defaults");
            None
        }
    }
}

/// Decodes `data` keeping every field that deserializes and defaulting the rest.
pub fn decode_lenient<T>(key: &str, data: Value) -> T
where
    T: Default + Serialize + DeserializeOwned,
{
    if let Ok(value) = serde_json::from_value::<T>(data.clone()) {
        return value;
    }

    let Value::Object(fields) = data else {
        // Arrays and scalars decode whole or not at all.
        warn!(key, "record could not be decoded, using defaults");
        return T::default();
    };
    let mut merged = match serde_json::to_value(T::default()) {
        Ok(Value::Object(base)) => base,
        _ => return T::default(),
    };
    for (field, value) in fields {
        let previous = merged.insert(field.clone(), value);
        if serde_json::from_value::<T>(Value::Object(merged.clone())).is_err() {
            warn!(key, field = %field, "dropping unreadable field");
            match previous {
                Some(prev) => merged.insert(field, prev),
                None => merged.remove(&field),
            };
        }
    }
    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

/// Upgrades a settings payload from `version` to [`SETTINGS_VERSION`].
pub fn upgrade_settings(version: u32, mut data: Value) -> Value {
    if version < 2 {
        settings_v1_to_v2(&mut data);
    }
    if version < 3 {
        settings_v2_to_v3(&mut data);
    }
    data
}

fn settings_v1_to_v2(data: &mut Value) {
    let Some(obj) = data.as_object_mut() else {
        return;
    };
    if let Some(day) = obj.get("dst_check_day").and_then(Value::as_i64) {
        let converted = match DstCheckDay::from_legacy(day) {
            Some(d) => serde_json::to_value(d).unwrap_or(Value::Null),
            None => Value::Null,
        };
        debug!(day, to = %converted, "converting legacy dst_check_day");
        obj.insert("dst_check_day".to_string(), converted);
    }
}

fn settings_v2_to_v3(data: &mut Value) {
    let Some(obj) = data.as_object_mut() else {
        return;
    };
    if obj.get("monitor_period").and_then(Value::as_u64) == Some(0) {
        obj.insert("monitor_period".to_string(), json!(5));
    }
}

pub fn decode_settings(raw: &str) -> Settings {
    let Some(envelope) = open_envelope("settings", raw) else {
        return Settings::default();
    };
    let data = if envelope.version > SETTINGS_VERSION {
        warn!(
            version = envelope.version,
            supported = SETTINGS_VERSION,
            "settings written by a newer version, reading known fields"
        );
        envelope.data
    } else {
        upgrade_settings(envelope.version, envelope.data)
    };
    decode_lenient::<Settings>("settings", data).sanitized()
}

pub fn decode_state(raw: &str) -> RuntimeState {
    match open_envelope("state", raw) {
        Some(envelope) => decode_lenient("state", envelope.data),
        None => RuntimeState::default(),
    }
}

pub fn decode_alarms(raw: &str) -> WeeklyAlarmTable {
    match open_envelope("alarms", raw) {
        Some(envelope) => decode_lenient::<WeeklyAlarmTable>("alarms", envelope.data).sanitized(),
        None => WeeklyAlarmTable::default(),
    }
}
