//! Alarm data model.
//!
//! The weekly table holds one [`DayAlarm`] per weekday (Sunday first). A
//! separate one-time alarm of the same shape takes priority over the table
//! while enabled.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::{day_name_short, format_clock};

pub const DEFAULT_ALARM_HOUR: u8 = 7;
pub const DEFAULT_ALARM_MINUTE: u8 = 0;

/// One alarm entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAlarm {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_hour")]
    pub hour: u8,
    #[serde(default)]
    pub minute: u8,
}

fn default_hour() -> u8 {
    DEFAULT_ALARM_HOUR
}

impl Default for DayAlarm {
    fn default() -> Self {
        Self {
            enabled: false,
            hour: DEFAULT_ALARM_HOUR,
            minute: DEFAULT_ALARM_MINUTE,
        }
    }
}

impl DayAlarm {
    /// An enabled alarm, validated.
    pub fn at(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        let alarm = Self { enabled: true, hour, minute };
        alarm.validate()?;
        Ok(alarm)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hour > 23 {
            return Err(ValidationError::Hour(self.hour));
        }
        if self.minute > 59 {
            return Err(ValidationError::Minute(self.minute));
        }
        Ok(())
    }

    pub fn disabled(self) -> Self {
        Self { enabled: false, ..self }
    }

    /// Minutes since midnight.
    pub fn minute_of_day(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }

    /// "7:05" / "7:05 AM", or "OFF" when disabled.
    pub fn label(&self, is_24h: bool) -> String {
        if self.enabled {
            format_clock(self.hour, self.minute, is_24h)
        } else {
            "OFF".to_string()
        }
    }
}

/// Seven alarms indexed 0 (Sunday) to 6 (Saturday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklyAlarmTable(pub [DayAlarm; 7]);

impl WeeklyAlarmTable {
    pub fn get(&self, day: usize) -> Option<&DayAlarm> {
        self.0.get(day)
    }

    pub fn set(&mut self, day: usize, alarm: DayAlarm) -> Result<(), ValidationError> {
        alarm.validate()?;
        let slot = self.0.get_mut(day).ok_or(ValidationError::Weekday(day))?;
        *slot = alarm;
        Ok(())
    }

    /// Sets every day to the same alarm.
    pub fn set_all(&mut self, alarm: DayAlarm) -> Result<(), ValidationError> {
        alarm.validate()?;
        self.0 = [alarm; 7];
        Ok(())
    }

    pub fn any_enabled(&self) -> bool {
        self.0.iter().any(|a| a.enabled)
    }

    /// Drops entries that fail validation back to the disabled default.
    pub fn sanitized(mut self) -> Self {
        for alarm in self.0.iter_mut() {
            if alarm.validate().is_err() {
                *alarm = DayAlarm::default();
            }
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &DayAlarm)> {
        self.0.iter().enumerate()
    }
}

/// What fires next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "day", rename_all = "snake_case")]
pub enum NextAlarm {
    None,
    OneTime,
    /// Skip horizon is a week or more out; resolved by scanning forward from the skip date.
    SkipWeek,
    WeekdayIndex(usize),
}

impl NextAlarm {
    pub fn is_some(&self) -> bool {
        !matches!(self, NextAlarm::None)
    }

    /// Short label of the alarm's day, "Once" for the one-time alarm.
    pub fn day_label(&self) -> &'static str {
        match self {
            NextAlarm::WeekdayIndex(d) => day_name_short(*d),
            NextAlarm::OneTime => "Once",
            NextAlarm::SkipWeek | NextAlarm::None => "",
        }
    }
}
