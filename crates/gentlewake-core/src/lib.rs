//! # GentleWake Core Library
//!
//! Core logic of the GentleWake wrist alarm clock: weekly alarms with
//! snooze, smart (movement-triggered) wake within a window before the alarm,
//! escalating vibration, and a Get-Out-of-Bed follow-up alarm.
//!
//! ## Architecture
//!
//! - **Scheduler**: pure next-alarm and wake-up planning, plus the collision
//!   retry policy against the OS wake primitive
//! - **Machine**: one `handle_event(&mut AppState, &TimeContext, Event)`
//!   function that returns side effects instead of performing them
//! - **Runtime**: executes side effects against collaborator traits and runs
//!   deferred timers
//! - **Storage**: SQLite key-value store of versioned JSON blobs
//! - **Simulation**: manual clock and in-memory collaborators for tests and
//!   scripted scenarios
//!
//! ## Key Components
//!
//! - [`AppState`]: everything mutable
//! - [`App`]: the event loop
//! - [`Database`]: persistence
//! - [`Settings`]: user configuration

pub mod alarm;
pub mod deferred;
pub mod error;
pub mod events;
pub mod machine;
pub mod motion;
pub mod platform;
pub mod runtime;
pub mod scheduler;
pub mod simulation;
pub mod stop_code;
pub mod storage;
pub mod time;
pub mod vibration;

pub use alarm::{DayAlarm, NextAlarm, WeeklyAlarmTable};
pub use error::{ConfigError, CoreError, ScheduleError, SensorError, StoreError, ValidationError};
pub use events::{Button, Event, PressKind, SideEffect, TimerKind, WakeId, WakeReason, WakeSlot};
pub use machine::{handle_event, AlarmPhase, AppState, RuntimeState};
pub use platform::{Accelerometer, Clock, Display, Haptics, WakeScheduler};
pub use runtime::{App, Collaborators};
pub use scheduler::{compute_next_alarm, plan_wakeups, ScheduleInput, WakePlan};
pub use storage::{Database, MemoryStore, Settings, Store};
pub use time::TimeContext;
