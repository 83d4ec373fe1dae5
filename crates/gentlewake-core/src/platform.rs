//! Collaborator interfaces.
//!
//! The core never talks to hardware directly. The runtime executes side
//! effects against these traits; the watch shell, the CLI and the simulation
//! harness each provide their own implementations.

use chrono::{DateTime, Local, Utc};

use crate::error::{ScheduleError, SensorError};
use crate::events::{Button, StatusKind, WakeId, WakeReason};
use crate::time::{offset_from_secs, TimeContext};

/// Wall-clock and timezone queries.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn is_24h_style(&self) -> bool;

    /// Seconds east of UTC currently in force.
    fn local_offset(&self) -> i32;

    /// Snapshot used for one event dispatch.
    fn context(&self) -> TimeContext {
        TimeContext::new(
            self.now(),
            offset_from_secs(self.local_offset()),
            self.is_24h_style(),
        )
    }
}

/// The OS wake-up primitive.
pub trait WakeScheduler {
    /// Requests a wake-up at `at`. Fails with [`ScheduleError::RangeConflict`]
    /// when another wake sits within a minute of `at`.
    fn schedule(
        &mut self,
        at: DateTime<Utc>,
        reason: WakeReason,
        missed_alert: bool,
    ) -> Result<WakeId, ScheduleError>;

    fn cancel(&mut self, id: WakeId);

    /// Cancels every wake this app owns.
    fn cancel_all(&mut self);

    /// Fire time of `id` if it is still pending.
    fn query(&self, id: WakeId) -> Option<DateTime<Utc>>;
}

/// Vibration motor and backlight.
pub trait Haptics {
    /// Plays alternating on/off durations in milliseconds.
    fn vibrate(&mut self, segments: &[u32]);

    fn cancel(&mut self);

    fn light_pulse(&mut self);
}

pub trait Accelerometer {
    fn subscribe(&mut self, rate_hz: u32) -> Result<(), SensorError>;

    fn unsubscribe(&mut self);
}

/// Presentation callbacks. Every method has a no-op default so headless
/// shells only implement what they show.
pub trait Display {
    fn update_clock(&mut self, _ctx: &TimeContext) {}

    fn update_onoff(&mut self, _on: bool) {}

    fn update_next_alarm_info(&mut self, _text: &str) {}

    fn show_alarm_active(&mut self, _active: bool, _goob: bool) {}

    fn show_status(&mut self, _at: Option<DateTime<Utc>>, _kind: Option<StatusKind>) {}

    fn show_stop_code(&mut self, _sequence: &[Button], _entered: usize) {}

    fn show_message(&mut self, _text: &str) {}
}

/// The host's real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    pub is_24h: bool,
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn is_24h_style(&self) -> bool {
        self.is_24h
    }

    fn local_offset(&self) -> i32 {
        Local::now().offset().local_minus_utc()
    }
}
