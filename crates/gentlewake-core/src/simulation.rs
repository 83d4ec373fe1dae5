//! Deterministic simulation harness.
//!
//! In-memory collaborators driven by a manual clock, plus a TOML scenario
//! runner. Every collaborator is a cheap handle over shared state so a test
//! can keep one copy for inspection while the [`App`] owns another.
//!
//! Scenarios look like:
//!
//! ```toml
//! start = "2024-03-04T06:00:00Z"
//!
//! [settings]
//! smart_alarm = true
//!
//! [[alarms]]
//! day = 1
//! hour = 7
//! minute = 0
//!
//! [[steps]]
//! at = "2024-03-04T06:40:00Z"
//! action = "stir"
//!
//! [[steps]]
//! action = "expect"
//! phase = "active"
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alarm::{DayAlarm, WeeklyAlarmTable};
use crate::error::{CoreError, Result, ScheduleError, SensorError};
use crate::events::{AccelSample, Button, Event, PressKind, StatusKind, WakeId, WakeReason};
use crate::platform::{Accelerometer, Clock, Display, Haptics, WakeScheduler};
use crate::runtime::{App, Collaborators};
use crate::storage::{MemoryStore, Settings, Store};
use crate::time::TimeContext;

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
    offset_secs: Rc<Cell<i32>>,
    is_24h: bool,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
            offset_secs: Rc::new(Cell::new(0)),
            is_24h: true,
        }
    }

    pub fn with_offset(self, offset_secs: i32) -> Self {
        self.offset_secs.set(offset_secs);
        self
    }

    pub fn with_24h(mut self, is_24h: bool) -> Self {
        self.is_24h = is_24h;
        self
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now.set(at);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Changes the local offset, e.g. to model a DST transition.
    pub fn set_offset(&self, offset_secs: i32) {
        self.offset_secs.set(offset_secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn is_24h_style(&self) -> bool {
        self.is_24h
    }

    fn local_offset(&self) -> i32 {
        self.offset_secs.get()
    }
}

/// A wake held by [`SimWakeScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimWake {
    pub id: WakeId,
    pub at: DateTime<Utc>,
    pub reason: WakeReason,
    pub missed_alert: bool,
}

#[derive(Debug, Default)]
struct WakeTable {
    next_id: i32,
    own: Vec<SimWake>,
    /// Wakes held by other apps.
    foreign: Vec<DateTime<Utc>>,
    fail_code: Option<i32>,
    attempts: usize,
}

/// Wake scheduler that rejects any request within a minute of another wake,
/// whether ours or another app's.
#[derive(Debug, Clone, Default)]
pub struct SimWakeScheduler {
    inner: Rc<RefCell<WakeTable>>,
}

impl SimWakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `at` for another app.
    pub fn add_foreign(&self, at: DateTime<Utc>) {
        self.inner.borrow_mut().foreign.push(at);
    }

    /// Every subsequent request fails with `code` until cleared.
    pub fn fail_with(&self, code: Option<i32>) {
        self.inner.borrow_mut().fail_code = code;
    }

    pub fn pending(&self) -> Vec<SimWake> {
        let mut wakes = self.inner.borrow().own.clone();
        wakes.sort_by_key(|w| w.at);
        wakes
    }

    /// Number of schedule calls made, including rejected ones.
    pub fn attempts(&self) -> usize {
        self.inner.borrow().attempts
    }

    pub fn next_due(&self) -> Option<SimWake> {
        self.inner.borrow().own.iter().min_by_key(|w| w.at).copied()
    }

    /// Removes and returns the earliest wake due at or before `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Option<SimWake> {
        let mut table = self.inner.borrow_mut();
        let (pos, _) = table
            .own
            .iter()
            .enumerate()
            .filter(|(_, w)| w.at <= now)
            .min_by_key(|(_, w)| w.at)?;
        Some(table.own.remove(pos))
    }
}

impl WakeScheduler for SimWakeScheduler {
    fn schedule(
        &mut self,
        at: DateTime<Utc>,
        reason: WakeReason,
        missed_alert: bool,
    ) -> std::result::Result<WakeId, ScheduleError> {
        let mut table = self.inner.borrow_mut();
        table.attempts += 1;
        if let Some(code) = table.fail_code {
            return Err(ScheduleError::Unknown { code });
        }
        let near = |other: DateTime<Utc>| (other - at).num_seconds().abs() < 60;
        if table.foreign.iter().any(|t| near(*t)) || table.own.iter().any(|w| near(w.at)) {
            return Err(ScheduleError::RangeConflict { at });
        }
        table.next_id += 1;
        let id = WakeId(table.next_id);
        table.own.push(SimWake {
            id,
            at,
            reason,
            missed_alert,
        });
        Ok(id)
    }

    fn cancel(&mut self, id: WakeId) {
        self.inner.borrow_mut().own.retain(|w| w.id != id);
    }

    fn cancel_all(&mut self) {
        self.inner.borrow_mut().own.clear();
    }

    fn query(&self, id: WakeId) -> Option<DateTime<Utc>> {
        self.inner.borrow().own.iter().find(|w| w.id == id).map(|w| w.at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum HapticCall {
    Vibrate { segments: Vec<u32> },
    Cancel,
    Light,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingHaptics {
    calls: Rc<RefCell<Vec<HapticCall>>>,
}

impl RecordingHaptics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HapticCall> {
        self.calls.borrow().clone()
    }

    pub fn vibrations(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, HapticCall::Vibrate { .. }))
            .count()
    }

    pub fn light_pulses(&self) -> usize {
        self.calls.borrow().iter().filter(|c| **c == HapticCall::Light).count()
    }
}

impl Haptics for RecordingHaptics {
    fn vibrate(&mut self, segments: &[u32]) {
        self.calls.borrow_mut().push(HapticCall::Vibrate {
            segments: segments.to_vec(),
        });
    }

    fn cancel(&mut self) {
        self.calls.borrow_mut().push(HapticCall::Cancel);
    }

    fn light_pulse(&mut self) {
        self.calls.borrow_mut().push(HapticCall::Light);
    }
}

#[derive(Debug, Default)]
struct AccelFlags {
    subscribed: bool,
    broken: bool,
    subscriptions: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SimAccelerometer {
    inner: Rc<RefCell<AccelFlags>>,
}

impl SimAccelerometer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subscription attempt fail.
    pub fn set_broken(&self, broken: bool) {
        self.inner.borrow_mut().broken = broken;
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner.borrow().subscribed
    }

    pub fn subscriptions(&self) -> usize {
        self.inner.borrow().subscriptions
    }
}

impl Accelerometer for SimAccelerometer {
    fn subscribe(&mut self, rate_hz: u32) -> std::result::Result<(), SensorError> {
        let mut flags = self.inner.borrow_mut();
        if flags.broken {
            return Err(SensorError::SubscribeFailed(format!("sensor offline at {rate_hz} Hz")));
        }
        flags.subscribed = true;
        flags.subscriptions += 1;
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.inner.borrow_mut().subscribed = false;
    }
}

/// What the screen would currently show.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screen {
    pub clock_updates: usize,
    pub alarms_on: bool,
    pub next_alarm_info: String,
    pub alarm_active: bool,
    pub goob: bool,
    pub status: Option<(DateTime<Utc>, StatusKind)>,
    pub stop_code: Option<(Vec<Button>, usize)>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingDisplay {
    screen: Rc<RefCell<Screen>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> Screen {
        self.screen.borrow().clone()
    }
}

impl Display for RecordingDisplay {
    fn update_clock(&mut self, _ctx: &TimeContext) {
        self.screen.borrow_mut().clock_updates += 1;
    }

    fn update_onoff(&mut self, on: bool) {
        self.screen.borrow_mut().alarms_on = on;
    }

    fn update_next_alarm_info(&mut self, text: &str) {
        self.screen.borrow_mut().next_alarm_info = text.to_string();
    }

    fn show_alarm_active(&mut self, active: bool, goob: bool) {
        let mut screen = self.screen.borrow_mut();
        screen.alarm_active = active;
        screen.goob = goob;
        if active {
            screen.stop_code = None;
        }
    }

    fn show_status(&mut self, at: Option<DateTime<Utc>>, kind: Option<StatusKind>) {
        self.screen.borrow_mut().status = at.zip(kind);
    }

    fn show_stop_code(&mut self, sequence: &[Button], entered: usize) {
        self.screen.borrow_mut().stop_code = Some((sequence.to_vec(), entered));
    }

    fn show_message(&mut self, text: &str) {
        self.screen.borrow_mut().messages.push(text.to_string());
    }
}

/// An [`App`] wired to simulated collaborators.
pub struct Simulation {
    pub app: App,
    pub clock: ManualClock,
    pub wakes: SimWakeScheduler,
    pub haptics: RecordingHaptics,
    pub accel: SimAccelerometer,
    pub display: RecordingDisplay,
    /// Wakes delivered so far, in order.
    pub fired: Vec<SimWake>,
    sample_ms: u64,
}

impl Simulation {
    /// Builds an app over a fresh store seeded with `settings` and `alarms`; call
    /// [`Simulation::launch`] before driving it.
    pub fn new(settings: Settings, alarms: WeeklyAlarmTable, start: DateTime<Utc>, seed: u64) -> Result<Self> {
        let mut store = MemoryStore::new();
        store.write_settings(&settings)?;
        store.write_alarms(&alarms)?;
        Ok(Self::with_store(Box::new(store), ManualClock::new(start), SimWakeScheduler::new(), seed))
    }

    /// Builds an app over an existing store without launching it.
    pub fn with_store(store: Box<dyn Store>, clock: ManualClock, wakes: SimWakeScheduler, seed: u64) -> Self {
        let haptics = RecordingHaptics::new();
        let accel = SimAccelerometer::new();
        let display = RecordingDisplay::new();
        let io = Collaborators {
            clock: Box::new(clock.clone()),
            wakes: Box::new(wakes.clone()),
            haptics: Box::new(haptics.clone()),
            accel: Box::new(accel.clone()),
            display: Box::new(display.clone()),
        };
        Self {
            app: App::with_seed(store, io, seed),
            clock,
            wakes,
            haptics,
            accel,
            display,
            fired: Vec::new(),
            sample_ms: 0,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn launch(&mut self) {
        self.app.launch(None);
        self.app.run_due_timers();
    }

    /// Runs timers and delivers wakes in time order up to `target`. A wake
    /// that arrives after the app exited relaunches it.
    pub fn advance_to(&mut self, target: DateTime<Utc>) {
        loop {
            let timer = self.app.next_timer_due();
            let wake = self.wakes.next_due();
            let next = match (timer, wake.map(|w| w.at)) {
                (Some(t), Some(w)) => t.min(w),
                (Some(t), None) => t,
                (None, Some(w)) => w,
                (None, None) => break,
            };
            if next > target {
                break;
            }
            if next > self.clock.now() {
                self.clock.set(next);
            }

            if timer.is_some_and(|t| t <= next) {
                self.app.run_due_timers();
                continue;
            }
            let Some(due) = self.wakes.take_due(self.clock.now()) else {
                break;
            };
            debug!(id = due.id.0, reason = ?due.reason, at = %due.at, "delivering wake");
            self.fired.push(due);
            if self.app.exit_requested() {
                self.app.relaunch(Some((due.id, due.reason)));
            } else {
                self.app.dispatch(Event::WakeFired {
                    id: due.id,
                    reason: due.reason,
                });
            }
            self.app.run_due_timers();
        }
        if target > self.clock.now() {
            self.clock.set(target);
        }
        self.app.run_due_timers();
    }

    pub fn advance(&mut self, by: Duration) {
        let target = self.clock.now() + by;
        self.advance_to(target);
    }

    /// Delivers a user event, relaunching the app first if it had exited.
    pub fn send(&mut self, event: Event) {
        if self.app.exit_requested() {
            self.app.relaunch(None);
        }
        self.app.dispatch(event);
        self.app.run_due_timers();
    }

    pub fn press(&mut self, button: Button, press: PressKind) {
        self.send(Event::ButtonPressed { button, press });
    }

    /// Kills the process without warning and starts it again.
    pub fn crash_and_relaunch(&mut self) {
        self.app.relaunch(None);
        self.app.run_due_timers();
    }

    /// Feeds one accelerometer batch if the sensor is subscribed.
    pub fn feed(&mut self, samples: Vec<AccelSample>) -> bool {
        if !self.accel.is_subscribed() {
            debug!("sensor not subscribed, batch dropped");
            return false;
        }
        self.app.dispatch(Event::AccelBatch { samples });
        self.app.run_due_timers();
        true
    }

    /// One second of restless movement.
    pub fn stir_batch(&mut self) -> Vec<AccelSample> {
        (0..10)
            .map(|i| {
                let v = if i % 2 == 0 { 300 } else { -300 };
                self.sample(v, v / 2, -1000)
            })
            .collect()
    }

    /// Six hard alternating swings, enough to cancel a Get-Out-of-Bed alarm.
    pub fn swing_batch(&mut self) -> Vec<AccelSample> {
        let mut out = Vec::new();
        for i in 0..6 {
            let v = if i % 2 == 0 { 1500 } else { -1500 };
            out.push(self.sample(v, 0, -1000));
            self.sample_ms += 200;
            out.push(self.sample(v, 0, -1000));
            self.sample_ms += 200;
        }
        out
    }

    /// Wrist turned toward the face.
    pub fn tilt_batch(&mut self) -> Vec<AccelSample> {
        self.sample_ms += EASY_LIGHT_GAP_MS;
        vec![self.sample(0, -900, -300)]
    }

    fn sample(&mut self, x: i16, y: i16, z: i16) -> AccelSample {
        self.sample_ms += 100;
        AccelSample {
            x,
            y,
            z,
            timestamp_ms: self.sample_ms,
            did_vibrate: false,
        }
    }
}

const EASY_LIGHT_GAP_MS: u64 = 5_000;

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioAlarm {
    pub day: usize,
    pub hour: u8,
    pub minute: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Only moves the clock.
    Advance,
    Press {
        button: Button,
        #[serde(default = "default_single")]
        press: PressKind,
    },
    Stir {
        #[serde(default = "default_batches")]
        batches: u32,
    },
    Swing,
    Tilt,
    Tick,
    Crash,
    ToggleAlarms,
    SetAlarm {
        day: usize,
        hour: u8,
        minute: u8,
    },
    SkipUntil {
        until: Option<DateTime<Utc>>,
    },
    SensorFailure,
    Expect {
        #[serde(default)]
        phase: Option<String>,
        #[serde(default)]
        snooze_count: Option<u32>,
        #[serde(default)]
        next_alarm_info: Option<String>,
        #[serde(default)]
        fired: Option<usize>,
    },
}

fn default_single() -> PressKind {
    PressKind::Single
}

fn default_batches() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// The clock advances here first.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub action: Action,
}

/// A scripted night.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub utc_offset: i32,
    #[serde(default = "default_true")]
    pub is_24h: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub alarms: Vec<ScenarioAlarm>,
    /// Wakes already held by other apps.
    #[serde(default)]
    pub foreign_wakes: Vec<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Outcome of a scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub final_phase: String,
    pub finished_at: DateTime<Utc>,
    pub fired: Vec<SimWake>,
    pub pending: Vec<SimWake>,
    pub vibrations: usize,
    pub light_pulses: usize,
    pub screen: Screen,
}

impl Scenario {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn alarm_table(&self) -> Result<WeeklyAlarmTable> {
        let mut table = WeeklyAlarmTable::default();
        for alarm in &self.alarms {
            let mut entry = DayAlarm::at(alarm.hour, alarm.minute)?;
            entry.enabled = alarm.enabled;
            table.set(alarm.day, entry)?;
        }
        Ok(table)
    }

    pub fn run(&self) -> Result<ScenarioReport> {
        let mut store = MemoryStore::new();
        store.write_settings(&self.settings)?;
        store.write_alarms(&self.alarm_table()?)?;
        let clock = ManualClock::new(self.start)
            .with_offset(self.utc_offset)
            .with_24h(self.is_24h);
        let wakes = SimWakeScheduler::new();
        for at in &self.foreign_wakes {
            wakes.add_foreign(*at);
        }
        let mut sim = Simulation::with_store(Box::new(store), clock, wakes, self.seed);
        sim.launch();

        for (index, step) in self.steps.iter().enumerate() {
            if let Some(at) = step.at {
                if at < sim.now() {
                    return Err(CoreError::Scenario(format!(
                        "step {index}: {at} is before the current time {}",
                        sim.now()
                    )));
                }
                sim.advance_to(at);
            }
            debug!(index, action = ?step.action, "scenario step");
            run_action(&mut sim, index, &step.action)?;
        }

        info!(phase = sim.app.phase().name(), fired = sim.fired.len(), "scenario finished");
        Ok(ScenarioReport {
            final_phase: sim.app.phase().name().to_string(),
            finished_at: sim.now(),
            fired: sim.fired.clone(),
            pending: sim.wakes.pending(),
            vibrations: sim.haptics.vibrations(),
            light_pulses: sim.haptics.light_pulses(),
            screen: sim.display.screen(),
        })
    }
}

fn run_action(sim: &mut Simulation, index: usize, action: &Action) -> Result<()> {
    match action {
        Action::Advance => {}
        Action::Press { button, press } => sim.press(*button, *press),
        Action::Stir { batches } => {
            for _ in 0..*batches {
                let batch = sim.stir_batch();
                sim.feed(batch);
                sim.advance(Duration::seconds(1));
            }
        }
        Action::Swing => {
            let batch = sim.swing_batch();
            sim.feed(batch);
        }
        Action::Tilt => {
            let batch = sim.tilt_batch();
            sim.feed(batch);
        }
        Action::Tick => sim.send(Event::ClockTick),
        Action::Crash => sim.crash_and_relaunch(),
        Action::ToggleAlarms => sim.send(Event::ToggleAlarms),
        Action::SetAlarm { day, hour, minute } => {
            let alarm = DayAlarm::at(*hour, *minute)?;
            sim.send(Event::SetDayAlarm { day: *day, alarm });
        }
        Action::SkipUntil { until } => sim.send(Event::SetSkipUntil { until: *until }),
        Action::SensorFailure => sim.accel.set_broken(true),
        Action::Expect {
            phase,
            snooze_count,
            next_alarm_info,
            fired,
        } => {
            let mismatch = |what: &str, want: String, got: String| {
                CoreError::Scenario(format!("step {index}: expected {what} {want}, got {got}"))
            };
            let actual = sim.app.phase().name();
            if let Some(want) = phase {
                if want != actual {
                    return Err(mismatch("phase", want.clone(), actual.to_string()));
                }
            }
            if let Some(want) = snooze_count {
                let got = sim.app.state().runtime.snooze_count;
                if *want != got {
                    return Err(mismatch("snooze count", want.to_string(), got.to_string()));
                }
            }
            if let Some(want) = next_alarm_info {
                let got = sim.display.screen().next_alarm_info;
                if *want != got {
                    return Err(mismatch("next alarm info", want.clone(), got));
                }
            }
            if let Some(want) = fired {
                if *want != sim.fired.len() {
                    return Err(mismatch("fired wakes", want.to_string(), sim.fired.len().to_string()));
                }
            }
        }
    }
    Ok(())
}
