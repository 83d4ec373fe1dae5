use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::DayAlarm;
use crate::error::ScheduleError;
use crate::storage::Settings;

/// Opaque handle of a scheduled OS wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WakeId(pub i32);

/// Why a hardware wake-up was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeReason {
    Alarm,
    Snooze,
    Monitor,
    DstCheck,
    GetOutOfBed,
}

/// Which of the three wake slots a request occupies. At most one request per slot
/// is ever outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeSlot {
    /// Alarm, Snooze or Monitor.
    Primary,
    GetOutOfBed,
    DstCheck,
}

impl WakeReason {
    /// Maximum shifted retries after a range conflict.
    pub fn max_shift_retries(self) -> u32 {
        match self {
            WakeReason::DstCheck => 10,
            _ => 5,
        }
    }
}

/// A wake-up the scheduler wants outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeRequest {
    pub at: DateTime<Utc>,
    pub reason: WakeReason,
    /// Whether the OS should notify the wearer if the wake is missed while powered off.
    pub missed_alert: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    Up,
    Select,
    Down,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressKind {
    Single,
    Double,
}

/// One accelerometer reading in milli-g.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub timestamp_ms: u64,
    /// Taken while the vibration motor was running.
    #[serde(default)]
    pub did_vibrate: bool,
}

/// Self-scheduled timers the machine asks the runtime to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Deferred wake arming after a state change.
    ArmWakeup,
    /// Next vibration pattern step.
    VibeTick,
    /// Debounced settings write.
    PersistSettings,
    /// Deferred accelerometer release.
    AccelUnsubscribe,
    /// Inactivity exit.
    AutoClose,
    /// Stop-code challenge inactivity.
    StopCodeTimeout,
}

/// Status banner shown on the clock face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Snooze,
    Monitor,
    GetOutOfBed,
}

/// Which OS wakes were still pending when the process started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingWakes {
    pub primary: bool,
    pub get_out_of_bed: bool,
    pub dst_check: bool,
}

/// Everything that can happen to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Process start. `pending` reflects the still-scheduled persisted wakes.
    Launched { pending: PendingWakes },
    /// The OS delivered a scheduled wake-up.
    WakeFired { id: WakeId, reason: WakeReason },
    /// A wake request was accepted by the OS.
    WakeScheduled {
        slot: WakeSlot,
        id: WakeId,
        reason: WakeReason,
        at: DateTime<Utc>,
    },
    /// A wake request failed for good.
    WakeFailed { slot: WakeSlot, error: ScheduleError },
    ButtonPressed { button: Button, press: PressKind },
    /// The stop-code challenge was completed.
    StopCodeEntered,
    AccelBatch { samples: Vec<AccelSample> },
    AccelUnavailable,
    TimerFired { kind: TimerKind },
    /// Minute-granularity clock tick.
    ClockTick,
    SetDayAlarm { day: usize, alarm: DayAlarm },
    SetOneTimeAlarm { alarm: DayAlarm },
    SetSkipUntil { until: Option<DateTime<Utc>> },
    ToggleAlarms,
    UpdateSettings { settings: Box<Settings> },
}

/// Collaborator calls requested by the machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SideEffect {
    ScheduleWake { slot: WakeSlot, request: WakeRequest },
    CancelWake { id: WakeId },
    PersistState,
    PersistAlarms,
    PersistSettings,
    StartTimer { kind: TimerKind, after_ms: u64 },
    CancelTimer { kind: TimerKind },
    Vibrate { segments: Vec<u32> },
    CancelVibration,
    LightPulse,
    SubscribeAccel,
    UnsubscribeAccel,
    UpdateClock,
    UpdateOnOff { on: bool },
    UpdateNextAlarmInfo { text: String },
    ShowAlarmActive { active: bool, goob: bool },
    ShowStatus { at: Option<DateTime<Utc>>, kind: Option<StatusKind> },
    ShowStopCode { sequence: Vec<Button>, entered: usize },
    ShowMessage { text: String },
    Exit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dst_check_gets_more_retries() {
        assert_eq!(WakeReason::DstCheck.max_shift_retries(), 10);
        assert_eq!(WakeReason::Alarm.max_shift_retries(), 5);
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::WakeFired { id: WakeId(7), reason: WakeReason::Monitor };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "WakeFired");
        assert_eq!(json["id"], 7);
        assert_eq!(json["reason"], "monitor");
    }

    #[test]
    fn sample_did_vibrate_defaults_false() {
        let sample: AccelSample =
            serde_json::from_str(r#"{"x":1,"y":2,"z":3,"timestamp_ms":100}"#).unwrap();
        assert!(!sample.did_vibrate);
    }
}
