//! Process-wide alarm settings.
//!
//! Stores user preferences including:
//! - Snooze delay and the dynamic-snooze policy
//! - Smart alarm (monitor period, movement sensitivity)
//! - Vibration pattern and the stop-alarm mode
//! - Get-Out-of-Bed mode
//! - DST-check weekday and hour
//! - The global on/off switch, one-time alarm and skip date
//!
//! Settings are persisted through a [`Store`](super::Store) as a versioned
//! JSON blob. Keys are addressed by dot path (`one_time_alarm.hour`).

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::alarm::DayAlarm;
use crate::error::ConfigError;

/// Smart-alarm movement sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Movement needed to end monitoring early. Higher sensitivity, lower bar.
    pub fn threshold(self) -> u32 {
        match self {
            Sensitivity::Low => 8000,
            Sensitivity::Medium => 4000,
            Sensitivity::High => 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VibePattern {
    #[default]
    Gentle,
    NotSoGentle,
    /// Gentle for the first two rounds, then not-so-gentle.
    #[serde(alias = "nsg_after_2_snoozes")]
    NsgAfterTwoSnoozes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoobMode {
    #[default]
    Off,
    /// Deadline counts from the moment the alarm starts vibrating.
    AfterAlarmStart,
    /// Deadline counts from the moment the alarm is stopped.
    AfterStopPress,
}

/// Weekdays the DST check may run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstCheckDay {
    Sunday,
    Tuesday,
    Friday,
}

impl DstCheckDay {
    pub fn weekday(self) -> Weekday {
        match self {
            DstCheckDay::Sunday => Weekday::Sun,
            DstCheckDay::Tuesday => Weekday::Tue,
            DstCheckDay::Friday => Weekday::Fri,
        }
    }

    /// Maps a legacy 1-based weekday number (1 = Sunday) to a check day.
    pub fn from_legacy(day: i64) -> Option<Self> {
        match day {
            1 => Some(DstCheckDay::Sunday),
            3 => Some(DstCheckDay::Tuesday),
            6 => Some(DstCheckDay::Friday),
            _ => None,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_true")]
    pub alarms_on: bool,
    #[serde(default = "default_snooze_delay")]
    pub snooze_delay: u32,
    #[serde(default)]
    pub dynamic_snooze: bool,
    #[serde(default)]
    pub easy_light: bool,
    #[serde(default)]
    pub smart_alarm: bool,
    /// Minutes before the alarm at which smart-alarm monitoring begins.
    #[serde(default = "default_monitor_period")]
    pub monitor_period: u32,
    #[serde(default)]
    pub sensitivity: Sensitivity,
    #[serde(default)]
    pub vibe_pattern: VibePattern,
    /// Minutes of inactivity before exiting; 0 disables.
    #[serde(default)]
    pub autoclose_timeout: u32,
    /// Require the stop-code challenge instead of a double press.
    #[serde(default)]
    pub konami_code: bool,
    #[serde(default)]
    pub goob_mode: GoobMode,
    #[serde(default = "default_goob_monitor_period")]
    pub goob_monitor_period: u32,
    #[serde(default = "default_dst_check_day")]
    pub dst_check_day: Option<DstCheckDay>,
    #[serde(default = "default_dst_check_hour")]
    pub dst_check_hour: u8,
    #[serde(default)]
    pub one_time_alarm: DayAlarm,
    /// Alarms before this instant are suppressed.
    #[serde(default)]
    pub skip_until: Option<DateTime<Utc>>,
}

// Default functions
fn default_true() -> bool {
    true
}

fn default_snooze_delay() -> u32 {
    9
}

fn default_monitor_period() -> u32 {
    30
}

fn default_goob_monitor_period() -> u32 {
    5
}

fn default_dst_check_day() -> Option<DstCheckDay> {
    Some(DstCheckDay::Sunday)
}

fn default_dst_check_hour() -> u8 {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            alarms_on: true,
            snooze_delay: default_snooze_delay(),
            dynamic_snooze: false,
            easy_light: false,
            smart_alarm: false,
            monitor_period: default_monitor_period(),
            sensitivity: Sensitivity::default(),
            vibe_pattern: VibePattern::default(),
            autoclose_timeout: 0,
            konami_code: false,
            goob_mode: GoobMode::default(),
            goob_monitor_period: default_goob_monitor_period(),
            dst_check_day: default_dst_check_day(),
            dst_check_hour: default_dst_check_hour(),
            one_time_alarm: DayAlarm::default(),
            skip_until: None,
        }
    }
}

impl Settings {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }
        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;
                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|_| invalid(format!("'{value}' is not true/false")))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    // Optional fields: "off" or "none" clear them.
                    serde_json::Value::String(_) | serde_json::Value::Null => {
                        match value.to_ascii_lowercase().as_str() {
                            "off" | "none" | "null" | "" => serde_json::Value::Null,
                            lower if value.chars().all(|c| c.is_ascii_alphabetic() || c == '_') => {
                                serde_json::Value::String(lower.to_string())
                            }
                            _ => serde_json::Value::String(value.to_string()),
                        }
                    }
                };
                obj.insert(part.to_string(), new_value);
                return Ok(());
            }
            current = current.get_mut(part).ok_or_else(unknown)?;
        }
        Err(unknown())
    }

    /// Get a settings value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => Some("off".to_string()),
            other => Some(other.to_string()),
        }
    }

    /// Set a settings value by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the result is out of range. On error `self` is unchanged.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Settings =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its current value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                serde_json::Value::Null => out.push((prefix.to_string(), "off".to_string())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn range(key: &str, value: u32, lo: u32, hi: u32) -> Result<(), ConfigError> {
            if (lo..=hi).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("{value} is outside {lo}-{hi}"),
                })
            }
        }

        range("snooze_delay", self.snooze_delay, 3, 20)?;
        range("monitor_period", self.monitor_period, 5, 60)?;
        range("autoclose_timeout", self.autoclose_timeout, 0, 10)?;
        range("goob_monitor_period", self.goob_monitor_period, 5, 30)?;
        range("dst_check_hour", u32::from(self.dst_check_hour), 3, 9)?;
        self.one_time_alarm
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                key: "one_time_alarm".to_string(),
                message: e.to_string(),
            })
    }

    /// Clamps out-of-range fields back to their defaults. Used on load so a
    /// corrupt blob never prevents alarms from firing.
    pub fn sanitized(mut self) -> Self {
        let defaults = Settings::default();
        if !(3..=20).contains(&self.snooze_delay) {
            self.snooze_delay = defaults.snooze_delay;
        }
        if !(5..=60).contains(&self.monitor_period) {
            self.monitor_period = if self.monitor_period == 0 { 5 } else { defaults.monitor_period };
        }
        if self.autoclose_timeout > 10 {
            self.autoclose_timeout = defaults.autoclose_timeout;
        }
        if !(5..=30).contains(&self.goob_monitor_period) {
            self.goob_monitor_period = defaults.goob_monitor_period;
        }
        if !(3..=9).contains(&self.dst_check_hour) {
            self.dst_check_hour = defaults.dst_check_hour;
        }
        if self.one_time_alarm.validate().is_err() {
            self.one_time_alarm = DayAlarm::default();
        }
        self
    }

    /// Monitor lead time in seconds; 0 means the 5 minute default.
    pub fn monitor_lead_secs(&self) -> i64 {
        let minutes = if self.monitor_period == 0 { 5 } else { self.monitor_period };
        i64::from(minutes) * 60
    }
}
