//! Alarm lifecycle state machine.
//!
//! All mutable application state lives in one [`AppState`]. Every input is
//! an [`Event`]; [`handle_event`] applies it and returns the collaborator
//! calls to make as [`SideEffect`]s. Nothing in here touches a clock, a
//! store or the OS, so any sequence of events can be replayed in tests.
//!
//! ## Phases
//!
//! ```text
//! Idle -> Monitoring -> Active -> Snoozing -> Active -> ... -> Idle
//!                                   \-> GooBMonitoring -> Idle | GooBActive
//! ```
//!
//! The phase is derived from the persisted [`RuntimeState`] flags, so a
//! process killed mid-transition resumes where it left off.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::alarm::{DayAlarm, WeeklyAlarmTable};
use crate::error::ScheduleError;
use crate::events::{
    AccelSample, Button, Event, PendingWakes, PressKind, SideEffect, StatusKind, TimerKind,
    WakeId, WakeReason, WakeSlot,
};
use crate::motion::MotionClassifier;
use crate::scheduler::{next_alarm_text, plan_wakeups, snooze_period, ScheduleInput};
use crate::stop_code::{StopCode, StopCodeProgress, STOP_CODE_TIMEOUT_MS};
use crate::storage::config::GoobMode;
use crate::storage::Settings;
use crate::time::TimeContext;
use crate::vibration::{select_pattern, VibrationDirector};

/// Delay between a state change and arming the wake, so the screen can redraw first.
pub const ARM_DELAY_MS: u64 = 150;
pub const SETTINGS_DEBOUNCE_MS: u64 = 1000;
pub const ACCEL_UNSUBSCRIBE_DELAY_MS: u64 = 100;
pub const ACCEL_RATE_HZ: u32 = 10;
/// An unattended alarm resets instead of snoozing again once its cumulative
/// snooze exceeds this.
pub const MAX_SNOOZED_SECS: i64 = 3600;
/// Furthest a skip date may be set.
pub const MAX_SKIP_DAYS: i64 = 28;

const ALERT_SEGMENTS: [u32; 3] = [200, 100, 200];

/// A wake the OS accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeRecord {
    pub id: WakeId,
    pub reason: WakeReason,
    pub at: DateTime<Utc>,
}

/// Outstanding wakes, one per slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeRecords {
    pub primary: Option<WakeRecord>,
    pub get_out_of_bed: Option<WakeRecord>,
    pub dst_check: Option<WakeRecord>,
}

impl WakeRecords {
    pub fn get(&self, slot: WakeSlot) -> Option<&WakeRecord> {
        match slot {
            WakeSlot::Primary => self.primary.as_ref(),
            WakeSlot::GetOutOfBed => self.get_out_of_bed.as_ref(),
            WakeSlot::DstCheck => self.dst_check.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: WakeSlot) -> &mut Option<WakeRecord> {
        match slot {
            WakeSlot::Primary => &mut self.primary,
            WakeSlot::GetOutOfBed => &mut self.get_out_of_bed,
            WakeSlot::DstCheck => &mut self.dst_check,
        }
    }

    pub fn set(&mut self, slot: WakeSlot, record: WakeRecord) {
        *self.slot_mut(slot) = Some(record);
    }

    pub fn take(&mut self, slot: WakeSlot) -> Option<WakeRecord> {
        self.slot_mut(slot).take()
    }

    /// Slot holding `id`, if any.
    pub fn find(&self, id: WakeId) -> Option<WakeSlot> {
        [WakeSlot::Primary, WakeSlot::GetOutOfBed, WakeSlot::DstCheck]
            .into_iter()
            .find(|slot| self.get(*slot).is_some_and(|r| r.id == id))
    }

    pub fn take_all(&mut self) -> Vec<WakeRecord> {
        [WakeSlot::Primary, WakeSlot::GetOutOfBed, WakeSlot::DstCheck]
            .into_iter()
            .filter_map(|slot| self.take(slot))
            .collect()
    }
}

/// Lifecycle variables persisted after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeState {
    pub alarm_active: bool,
    pub goob_active: bool,
    pub snoozing: bool,
    pub monitoring: bool,
    pub goob_monitoring: bool,
    pub snooze_count: u32,
    /// Sum of applied snooze periods this episode.
    pub snoozed_secs: i64,
    /// Local day whose alarm was already dismissed.
    pub last_reset_day: Option<NaiveDate>,
    pub snooze_until: Option<DateTime<Utc>>,
    pub goob_deadline: Option<DateTime<Utc>>,
    /// The ringing episode belongs to the one-time alarm.
    pub one_time_episode: bool,
    /// The pending snooze belongs to a Get-Out-of-Bed alarm.
    pub goob_episode: bool,
    /// Local day of the alarm that started this episode.
    pub episode_day: Option<NaiveDate>,
    /// Fire time of the regular alarm the primary wake leads to.
    pub next_alarm_at: Option<DateTime<Utc>>,
    pub wakes: WakeRecords,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AlarmPhase {
    Idle { on: bool },
    Monitoring,
    Active,
    GooBActive,
    Snoozing,
    GooBMonitoring,
}

impl AlarmPhase {
    pub fn name(self) -> &'static str {
        match self {
            AlarmPhase::Idle { .. } => "idle",
            AlarmPhase::Monitoring => "monitoring",
            AlarmPhase::Active => "active",
            AlarmPhase::GooBActive => "goob_active",
            AlarmPhase::Snoozing => "snoozing",
            AlarmPhase::GooBMonitoring => "goob_monitoring",
        }
    }

    /// Vibrating right now.
    pub fn is_ringing(self) -> bool {
        matches!(self, AlarmPhase::Active | AlarmPhase::GooBActive)
    }

    pub fn can_stop(self) -> bool {
        !matches!(self, AlarmPhase::Idle { .. })
    }

    pub fn can_snooze(self) -> bool {
        matches!(
            self,
            AlarmPhase::Active | AlarmPhase::GooBActive | AlarmPhase::Snoozing
        )
    }
}

/// The whole mutable state of the application.
#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Settings,
    pub alarms: WeeklyAlarmTable,
    pub runtime: RuntimeState,
    pub vibration: VibrationDirector,
    pub motion: MotionClassifier,
    pub stop_code: Option<StopCode>,
    pub accel_subscribed: bool,
    /// Cleared for the session once a subscription fails.
    pub accel_available: bool,
    exit_after_arm: bool,
    rng: Pcg32,
}

impl AppState {
    pub fn new(settings: Settings, alarms: WeeklyAlarmTable, runtime: RuntimeState) -> Self {
        Self::with_seed(settings, alarms, runtime, rand::random())
    }

    /// Deterministic stop-code generation for tests and simulation.
    pub fn with_seed(
        settings: Settings,
        alarms: WeeklyAlarmTable,
        runtime: RuntimeState,
        seed: u64,
    ) -> Self {
        Self {
            settings,
            alarms,
            runtime,
            vibration: VibrationDirector::new(),
            motion: MotionClassifier::new(),
            stop_code: None,
            accel_subscribed: false,
            accel_available: true,
            exit_after_arm: false,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> AlarmPhase {
        let rt = &self.runtime;
        if rt.goob_active {
            AlarmPhase::GooBActive
        } else if rt.alarm_active {
            AlarmPhase::Active
        } else if rt.monitoring {
            AlarmPhase::Monitoring
        } else if rt.snoozing {
            AlarmPhase::Snoozing
        } else if rt.goob_monitoring {
            AlarmPhase::GooBMonitoring
        } else {
            AlarmPhase::Idle {
                on: self.settings.alarms_on,
            }
        }
    }

    pub fn schedule_input(&self) -> ScheduleInput<'_> {
        ScheduleInput::new(&self.settings, &self.alarms, &self.runtime)
    }

    /// Whether the accelerometer should be streaming in the current state.
    pub fn accel_wanted(&self) -> bool {
        let rt = &self.runtime;
        self.accel_available
            && (rt.monitoring
                || rt.goob_monitoring
                || (self.settings.easy_light
                    && (rt.alarm_active || rt.goob_active || rt.snoozing)))
    }
}

/// Applies one event and returns the collaborator calls it requires.
pub fn handle_event(state: &mut AppState, ctx: &TimeContext, event: Event) -> Vec<SideEffect> {
    let before = state.phase();
    let mut dispatch = Dispatch {
        state,
        ctx,
        fx: Vec::new(),
    };
    dispatch.dispatch(event);
    let after = dispatch.state.phase();
    if before != after {
        info!(from = ?before, to = ?after, "alarm phase changed");
    }
    dispatch.fx
}

/// User-facing text for a scheduling failure.
pub fn schedule_error_message(error: &ScheduleError, ctx: &TimeContext) -> String {
    match error {
        ScheduleError::RangeConflict { at } | ScheduleError::Exhausted { at, .. } => {
            let local = ctx.local_of(*at);
            let time = if ctx.is_24h {
                local.format("%a %H:%M").to_string()
            } else {
                local.format("%a %-I:%M %p").to_string()
            };
            format!(
                "Another app has a wake-up scheduled near {time}. \
                 Change the time of one of the two alarms."
            )
        }
        ScheduleError::Unknown { code } => format!(
            "Could not schedule the wake-up (error {code}). \
             If this keeps happening, try a factory reset."
        ),
    }
}

struct Dispatch<'a> {
    state: &'a mut AppState,
    ctx: &'a TimeContext,
    fx: Vec<SideEffect>,
}

impl Dispatch<'_> {
    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Launched { pending } => self.on_launch(pending),
            Event::WakeFired { id, reason } => self.on_wake(id, reason),
            Event::WakeScheduled {
                slot,
                id,
                reason,
                at,
            } => {
                debug!(?slot, ?reason, %at, id = id.0, "wake recorded");
                self.state
                    .runtime
                    .wakes
                    .set(slot, WakeRecord { id, reason, at });
                self.fx.push(SideEffect::PersistState);
            }
            Event::WakeFailed { slot, error } => {
                error!(?slot, %error, "wake could not be scheduled");
                let text = schedule_error_message(&error, self.ctx);
                self.fx.push(SideEffect::ShowMessage { text });
                self.fx.push(SideEffect::Vibrate {
                    segments: ALERT_SEGMENTS.to_vec(),
                });
            }
            Event::ButtonPressed { button, press } => self.on_button(button, press),
            Event::StopCodeEntered => {
                if self.state.phase().can_stop() {
                    self.stop();
                }
            }
            Event::AccelBatch { samples } => self.on_accel(&samples),
            Event::AccelUnavailable => self.on_accel_unavailable(),
            Event::TimerFired { kind } => self.on_timer(kind),
            Event::ClockTick => self.on_clock_tick(),
            Event::SetDayAlarm { day, alarm } => self.set_day_alarm(day, alarm),
            Event::SetOneTimeAlarm { alarm } => self.set_one_time_alarm(alarm),
            Event::SetSkipUntil { until } => self.set_skip_until(until),
            Event::ToggleAlarms => self.toggle_alarms(),
            Event::UpdateSettings { settings } => self.update_settings(*settings),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    fn on_launch(&mut self, pending: PendingWakes) {
        self.state.motion.reset();
        self.state.vibration.stop();
        self.state.accel_subscribed = false;
        self.state.stop_code = None;
        self.fx.push(SideEffect::UpdateClock);

        let now = self.ctx.now;
        let rt = &self.state.runtime;
        if rt.alarm_active || rt.goob_active {
            warn!("resuming an alarm that was ringing when the process stopped");
            let goob = rt.goob_active;
            self.start_alarm(goob);
        } else if rt.snoozing && !pending.primary && rt.snooze_until.map_or(true, |u| u <= now) {
            warn!("snooze expired while the process was not running");
            let goob = rt.goob_episode;
            self.start_alarm(goob);
        } else if rt.monitoring
            && !pending.primary
            && rt.next_alarm_at.map_or(true, |at| at <= now)
        {
            warn!("alarm came due while monitoring was interrupted");
            self.start_alarm(false);
        } else if rt.goob_monitoring
            && !pending.get_out_of_bed
            && rt.goob_deadline.is_some_and(|d| d <= now)
        {
            warn!("get-out-of-bed deadline passed while the process was not running");
            self.start_alarm(true);
        } else {
            self.request_arm();
            self.update_accel();
            self.refresh_display();
            self.restart_autoclose();
        }
    }

    fn on_wake(&mut self, id: WakeId, reason: WakeReason) {
        let Some(slot) = self.state.runtime.wakes.find(id) else {
            warn!(id = id.0, ?reason, "ignoring wake with unknown id");
            self.request_arm();
            return;
        };
        let record = self.state.runtime.wakes.take(slot);
        if record.is_some_and(|r| r.reason != reason) {
            warn!(id = id.0, ?reason, recorded = ?record.map(|r| r.reason), "wake reason mismatch");
        }
        info!(id = id.0, ?reason, "wake fired");
        self.fx.push(SideEffect::PersistState);

        let ringing = self.state.phase().is_ringing();
        match reason {
            WakeReason::DstCheck => {
                self.request_arm();
                if matches!(self.state.phase(), AlarmPhase::Idle { .. }) {
                    self.state.exit_after_arm = true;
                }
            }
            WakeReason::Alarm => {
                if ringing {
                    self.request_arm();
                    return;
                }
                self.mark_episode();
                self.start_alarm(false);
            }
            WakeReason::Monitor => {
                if ringing {
                    self.request_arm();
                    return;
                }
                self.mark_episode();
                if self.state.settings.smart_alarm {
                    self.state.runtime.monitoring = true;
                    self.fx.push(SideEffect::PersistState);
                    self.request_arm();
                    self.update_accel();
                    self.refresh_display();
                } else {
                    self.start_alarm(false);
                }
            }
            WakeReason::Snooze => {
                if ringing {
                    self.request_arm();
                    return;
                }
                if !self.state.runtime.snoozing {
                    warn!(id = id.0, "snooze wake after the alarm was dismissed");
                    self.request_arm();
                    return;
                }
                let goob = self.state.runtime.goob_episode;
                self.start_alarm(goob);
            }
            WakeReason::GetOutOfBed => {
                if self.state.runtime.goob_active {
                    self.request_arm();
                    return;
                }
                self.start_alarm(true);
            }
        }
    }

    /// Records which day's alarm this episode belongs to.
    fn mark_episode(&mut self) {
        let rt = &mut self.state.runtime;
        let day = rt
            .next_alarm_at
            .map(|at| self.ctx.local_date_of(at))
            .unwrap_or_else(|| self.ctx.today());
        rt.episode_day = Some(day);
        if self.state.settings.one_time_alarm.enabled {
            rt.one_time_episode = true;
        }
    }

    fn start_alarm(&mut self, goob: bool) {
        let now = self.ctx.now;
        let settings = &self.state.settings;
        let rt = &mut self.state.runtime;
        rt.monitoring = false;
        rt.snoozing = false;
        rt.snooze_until = None;
        if goob {
            rt.goob_active = true;
            rt.alarm_active = false;
            rt.goob_monitoring = false;
            rt.goob_deadline = None;
            rt.goob_episode = true;
        } else {
            rt.alarm_active = true;
            rt.goob_active = false;
            if settings.goob_mode == GoobMode::AfterAlarmStart
                && rt.goob_deadline.is_none()
                && !rt.goob_episode
            {
                rt.goob_deadline =
                    Some(now + Duration::minutes(i64::from(settings.goob_monitor_period)));
                rt.goob_monitoring = true;
            }
        }
        let clear_one_time = !goob && rt.one_time_episode && settings.one_time_alarm.enabled;
        let kind = select_pattern(settings.vibe_pattern, rt.snooze_count, goob);

        if clear_one_time {
            self.state.settings.one_time_alarm.enabled = false;
            self.fx.push(SideEffect::PersistSettings);
        }
        self.state.stop_code = None;
        self.fx.push(SideEffect::CancelTimer {
            kind: TimerKind::StopCodeTimeout,
        });
        if let Some(step) = self.state.vibration.start(kind) {
            self.fx.push(SideEffect::Vibrate {
                segments: step.segments,
            });
            self.fx.push(SideEffect::StartTimer {
                kind: TimerKind::VibeTick,
                after_ms: step.next_delay_ms,
            });
        }
        self.fx.push(SideEffect::CancelTimer {
            kind: TimerKind::AutoClose,
        });
        self.fx.push(SideEffect::ShowAlarmActive { active: true, goob });
        self.fx.push(SideEffect::PersistState);
        self.request_arm();
        self.update_accel();
        self.refresh_display();
    }

    fn snooze(&mut self) {
        let now = self.ctx.now;
        let settings = &self.state.settings;
        let rt = &mut self.state.runtime;
        rt.goob_episode = rt.goob_active || (rt.snoozing && rt.goob_episode);
        rt.alarm_active = false;
        rt.goob_active = false;
        rt.snoozing = true;
        rt.snooze_count += 1;
        let period = snooze_period(settings, rt.snooze_count);
        rt.snoozed_secs += period;
        rt.snooze_until = Some(now + Duration::seconds(period));
        info!(count = rt.snooze_count, period_secs = period, "snoozing");

        self.cancel_wake(WakeSlot::Primary);
        self.silence();
        self.fx.push(SideEffect::PersistState);
        self.request_arm();
        self.update_accel();
        self.refresh_display();
        self.restart_autoclose();
    }

    fn stop(&mut self) {
        let now = self.ctx.now;
        let today = self.ctx.today();
        let phase = self.state.phase();
        let settings = &self.state.settings;
        let rt = &mut self.state.runtime;

        let goob_only = phase == AlarmPhase::GooBMonitoring;
        let goob_alarm = rt.goob_active || (rt.snoozing && rt.goob_episode);
        if !goob_only && !goob_alarm && !rt.one_time_episode {
            rt.last_reset_day = Some(rt.episode_day.unwrap_or(today));
        }
        let clear_one_time = rt.one_time_episode && settings.one_time_alarm.enabled;

        rt.alarm_active = false;
        rt.goob_active = false;
        rt.snoozing = false;
        rt.monitoring = false;
        rt.snooze_count = 0;
        rt.snoozed_secs = 0;
        rt.snooze_until = None;
        rt.one_time_episode = false;
        rt.episode_day = None;

        // Only a still-running after-alarm-start deadline keeps its wake.
        let mut keep_goob_wake = false;
        if goob_only || goob_alarm {
            rt.goob_monitoring = false;
            rt.goob_deadline = None;
            rt.goob_episode = false;
        } else {
            match settings.goob_mode {
                GoobMode::AfterStopPress => {
                    rt.goob_deadline =
                        Some(now + Duration::minutes(i64::from(settings.goob_monitor_period)));
                    rt.goob_monitoring = true;
                }
                GoobMode::AfterAlarmStart if rt.goob_deadline.is_some_and(|d| d > now) => {
                    rt.goob_monitoring = true;
                    keep_goob_wake = true;
                }
                GoobMode::AfterAlarmStart | GoobMode::Off => {
                    rt.goob_deadline = None;
                    rt.goob_monitoring = false;
                }
            }
        }
        info!(goob_monitoring = rt.goob_monitoring, "alarm stopped");

        self.cancel_wake(WakeSlot::Primary);
        if !keep_goob_wake {
            self.cancel_wake(WakeSlot::GetOutOfBed);
        }
        if clear_one_time {
            self.state.settings.one_time_alarm.enabled = false;
            self.fx.push(SideEffect::PersistSettings);
        }
        self.silence();
        self.fx.push(SideEffect::PersistState);
        self.request_arm();
        self.update_accel();
        self.refresh_display();
        self.restart_autoclose();
    }

    /// Cancels the wake recorded in `slot` now. The deferred re-arm only
    /// schedules what replaces it.
    fn cancel_wake(&mut self, slot: WakeSlot) {
        if let Some(record) = self.state.runtime.wakes.take(slot) {
            debug!(?slot, id = record.id.0, reason = ?record.reason, "cancelling superseded wake");
            self.fx.push(SideEffect::CancelWake { id: record.id });
        }
    }

    /// Ends vibration and any stop-code challenge.
    fn silence(&mut self) {
        self.state.vibration.stop();
        self.state.stop_code = None;
        self.fx.push(SideEffect::CancelVibration);
        self.fx.push(SideEffect::CancelTimer {
            kind: TimerKind::VibeTick,
        });
        self.fx.push(SideEffect::CancelTimer {
            kind: TimerKind::StopCodeTimeout,
        });
        self.fx.push(SideEffect::ShowAlarmActive {
            active: false,
            goob: false,
        });
    }

    // ── Input ────────────────────────────────────────────────────────

    fn on_button(&mut self, button: Button, press: PressKind) {
        if self.state.stop_code.is_some() {
            self.on_stop_code_key(button, press);
            return;
        }

        let phase = self.state.phase();
        match press {
            PressKind::Double if phase.can_stop() => {
                let needs_code = phase.is_ringing() || phase == AlarmPhase::Snoozing;
                if self.state.settings.konami_code && needs_code {
                    self.begin_stop_code();
                } else {
                    self.stop();
                }
            }
            PressKind::Single if phase.is_ringing() => self.snooze(),
            PressKind::Single if phase == AlarmPhase::Snoozing && button != Button::Back => {
                self.snooze()
            }
            PressKind::Single if button == Button::Back => self.fx.push(SideEffect::Exit),
            PressKind::Single if button == Button::Up && matches!(phase, AlarmPhase::Idle { .. }) => {
                self.toggle_alarms();
                self.restart_autoclose();
            }
            _ => self.restart_autoclose(),
        }
    }

    fn begin_stop_code(&mut self) {
        let code = StopCode::generate(&mut self.state.rng);
        debug!(sequence = ?code.sequence(), "stop code challenge");
        self.fx.push(SideEffect::ShowStopCode {
            sequence: code.sequence().to_vec(),
            entered: 0,
        });
        self.fx.push(SideEffect::StartTimer {
            kind: TimerKind::StopCodeTimeout,
            after_ms: STOP_CODE_TIMEOUT_MS,
        });
        self.state.stop_code = Some(code);
    }

    fn on_stop_code_key(&mut self, button: Button, press: PressKind) {
        if button == Button::Back {
            self.abandon_stop_code();
            return;
        }
        if press != PressKind::Single {
            return;
        }
        let Some(code) = self.state.stop_code.as_mut() else {
            return;
        };
        let progress = code.press(button);
        let sequence = code.sequence().to_vec();
        let entered = code.entered();
        match progress {
            StopCodeProgress::Completed => self.dispatch(Event::StopCodeEntered),
            StopCodeProgress::Advanced | StopCodeProgress::Reset => {
                self.fx.push(SideEffect::ShowStopCode { sequence, entered });
                self.fx.push(SideEffect::StartTimer {
                    kind: TimerKind::StopCodeTimeout,
                    after_ms: STOP_CODE_TIMEOUT_MS,
                });
            }
        }
    }

    fn abandon_stop_code(&mut self) {
        if self.state.stop_code.take().is_none() {
            return;
        }
        let phase = self.state.phase();
        self.fx.push(SideEffect::CancelTimer {
            kind: TimerKind::StopCodeTimeout,
        });
        self.fx.push(SideEffect::ShowAlarmActive {
            active: phase.is_ringing(),
            goob: phase == AlarmPhase::GooBActive,
        });
    }

    fn on_accel(&mut self, samples: &[AccelSample]) {
        if !self.state.accel_subscribed {
            return;
        }
        let rt = &self.state.runtime;
        let light_wanted = self.state.settings.easy_light
            && (rt.alarm_active || rt.goob_active || rt.snoozing);
        if light_wanted && self.state.motion.easy_light(samples) {
            self.fx.push(SideEffect::LightPulse);
        }

        if self.state.runtime.monitoring {
            let threshold = self.state.settings.sensitivity.threshold();
            if self.state.motion.stirring(samples, threshold) {
                info!(movement = self.state.motion.movement(), "stirring detected, starting alarm early");
                self.start_alarm(false);
                return;
            }
        }

        if self.state.runtime.goob_monitoring && self.state.motion.arm_swing(samples) {
            info!("arm swings detected, cancelling get-out-of-bed alarm");
            let rt = &mut self.state.runtime;
            rt.goob_monitoring = false;
            rt.goob_deadline = None;
            rt.goob_episode = false;
            self.cancel_wake(WakeSlot::GetOutOfBed);
            self.fx.push(SideEffect::PersistState);
            self.request_arm();
            self.update_accel();
            self.refresh_display();
        }
    }

    fn on_accel_unavailable(&mut self) {
        if !self.state.accel_available {
            return;
        }
        warn!("accelerometer unavailable; motion features disabled for this session");
        self.state.accel_available = false;
        self.state.accel_subscribed = false;
        self.fx.push(SideEffect::ShowMessage {
            text: "Motion sensor unavailable. Smart alarm, easy light and arm-swing \
                   detection are off; alarms still fire on time."
                .to_string(),
        });
    }

    // ── Timers ───────────────────────────────────────────────────────

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::ArmWakeup => self.arm_now(),
            TimerKind::VibeTick => self.on_vibe_tick(),
            TimerKind::PersistSettings => self.fx.push(SideEffect::PersistSettings),
            TimerKind::AccelUnsubscribe => {
                if self.state.accel_subscribed && !self.state.accel_wanted() {
                    self.state.accel_subscribed = false;
                    self.state.motion.reset();
                    self.fx.push(SideEffect::UnsubscribeAccel);
                }
            }
            TimerKind::AutoClose => {
                let phase = self.state.phase();
                let idle_or_snoozing =
                    matches!(phase, AlarmPhase::Idle { .. } | AlarmPhase::Snoozing);
                if self.state.settings.autoclose_timeout > 0
                    && idle_or_snoozing
                    && self.state.stop_code.is_none()
                {
                    info!("closing after inactivity");
                    self.fx.push(SideEffect::Exit);
                }
            }
            TimerKind::StopCodeTimeout => self.abandon_stop_code(),
        }
    }

    fn on_vibe_tick(&mut self) {
        if !self.state.phase().is_ringing() {
            return;
        }
        match self.state.vibration.tick() {
            Some(step) => {
                self.fx.push(SideEffect::Vibrate {
                    segments: step.segments,
                });
                self.fx.push(SideEffect::StartTimer {
                    kind: TimerKind::VibeTick,
                    after_ms: step.next_delay_ms,
                });
            }
            None if self.state.runtime.snoozed_secs > MAX_SNOOZED_SECS => {
                info!(snoozed_secs = self.state.runtime.snoozed_secs, "pattern exhausted, resetting");
                self.stop();
            }
            None => {
                info!("pattern exhausted, snoozing automatically");
                self.snooze();
            }
        }
    }

    /// Cancels the outstanding wakes and requests the planned ones.
    fn arm_now(&mut self) {
        let plan = plan_wakeups(&self.state.schedule_input(), self.ctx);
        debug!(?plan, "arming wakes");

        let rt = &mut self.state.runtime;
        for record in rt.wakes.take_all() {
            self.fx.push(SideEffect::CancelWake { id: record.id });
        }
        if plan
            .primary
            .as_ref()
            .is_some_and(|p| matches!(p.reason, WakeReason::Alarm | WakeReason::Monitor))
        {
            rt.next_alarm_at = plan.alarm_at;
        }
        for (slot, request) in plan.requests() {
            self.fx.push(SideEffect::ScheduleWake {
                slot,
                request: request.clone(),
            });
        }
        self.fx.push(SideEffect::PersistState);
        self.refresh_display();

        if std::mem::take(&mut self.state.exit_after_arm) {
            self.fx.push(SideEffect::Exit);
        }
    }

    fn on_clock_tick(&mut self) {
        self.fx.push(SideEffect::UpdateClock);
        if self
            .state
            .settings
            .skip_until
            .is_some_and(|skip| skip <= self.ctx.now)
        {
            debug!("skip date reached");
            self.state.settings.skip_until = None;
            self.persist_settings_later();
        }
        self.refresh_display();
    }

    // ── Settings ─────────────────────────────────────────────────────

    fn set_day_alarm(&mut self, day: usize, alarm: DayAlarm) {
        if let Err(e) = self.state.alarms.set(day, alarm) {
            self.fx.push(SideEffect::ShowMessage { text: e.to_string() });
            return;
        }
        if day == self.ctx.today_index() && self.state.runtime.last_reset_day.is_some() {
            // An explicit edit of today's alarm re-enables it for today.
            self.state.runtime.last_reset_day = None;
            self.fx.push(SideEffect::PersistState);
        }
        self.fx.push(SideEffect::PersistAlarms);
        self.request_arm();
        self.refresh_display();
    }

    fn set_one_time_alarm(&mut self, alarm: DayAlarm) {
        if let Err(e) = alarm.validate() {
            self.fx.push(SideEffect::ShowMessage { text: e.to_string() });
            return;
        }
        self.state.settings.one_time_alarm = alarm;
        self.fx.push(SideEffect::PersistSettings);
        self.request_arm();
        self.refresh_display();
    }

    /// Stores the skip date as local midnight. Today or earlier clears it; it
    /// is capped four weeks out.
    fn set_skip_until(&mut self, until: Option<DateTime<Utc>>) {
        let today = self.ctx.today();
        let normalized = until.and_then(|at| {
            let date = self.ctx.local_date_of(at);
            if date <= today {
                None
            } else {
                let capped = date.min(today + Duration::days(MAX_SKIP_DAYS));
                Some(self.ctx.midnight(capped))
            }
        });
        self.state.settings.skip_until = normalized;
        self.fx.push(SideEffect::PersistSettings);
        self.request_arm();
        self.refresh_display();
    }

    fn toggle_alarms(&mut self) {
        let on = !self.state.settings.alarms_on;
        self.state.settings.alarms_on = on;
        info!(on, "alarms toggled");
        self.fx.push(SideEffect::PersistSettings);
        self.request_arm();
        self.refresh_display();
    }

    fn update_settings(&mut self, settings: Settings) {
        if let Err(e) = settings.validate() {
            self.fx.push(SideEffect::ShowMessage { text: e.to_string() });
            return;
        }
        self.state.settings = settings;
        self.persist_settings_later();
        self.request_arm();
        self.update_accel();
        self.refresh_display();
        self.restart_autoclose();
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn request_arm(&mut self) {
        self.fx.push(SideEffect::StartTimer {
            kind: TimerKind::ArmWakeup,
            after_ms: ARM_DELAY_MS,
        });
    }

    fn persist_settings_later(&mut self) {
        self.fx.push(SideEffect::StartTimer {
            kind: TimerKind::PersistSettings,
            after_ms: SETTINGS_DEBOUNCE_MS,
        });
    }

    fn restart_autoclose(&mut self) {
        let minutes = self.state.settings.autoclose_timeout;
        if minutes == 0 {
            self.fx.push(SideEffect::CancelTimer {
                kind: TimerKind::AutoClose,
            });
        } else {
            self.fx.push(SideEffect::StartTimer {
                kind: TimerKind::AutoClose,
                after_ms: u64::from(minutes) * 60_000,
            });
        }
    }

    /// Subscribes immediately; unsubscribing is deferred so it never runs
    /// inside the sample callback.
    fn update_accel(&mut self) {
        let wanted = self.state.accel_wanted();
        if wanted && !self.state.accel_subscribed {
            self.state.accel_subscribed = true;
            self.state.motion.reset();
            self.fx.push(SideEffect::CancelTimer {
                kind: TimerKind::AccelUnsubscribe,
            });
            self.fx.push(SideEffect::SubscribeAccel);
        } else if wanted {
            self.fx.push(SideEffect::CancelTimer {
                kind: TimerKind::AccelUnsubscribe,
            });
        } else if self.state.accel_subscribed {
            self.fx.push(SideEffect::StartTimer {
                kind: TimerKind::AccelUnsubscribe,
                after_ms: ACCEL_UNSUBSCRIBE_DELAY_MS,
            });
        }
    }

    fn refresh_display(&mut self) {
        let text = next_alarm_text(&self.state.schedule_input(), self.ctx);
        let rt = &self.state.runtime;
        let (at, kind) = if rt.snoozing {
            (rt.snooze_until, Some(StatusKind::Snooze))
        } else if rt.monitoring {
            (rt.next_alarm_at, Some(StatusKind::Monitor))
        } else if rt.goob_monitoring {
            (rt.goob_deadline, Some(StatusKind::GetOutOfBed))
        } else {
            (None, None)
        };
        self.fx.push(SideEffect::UpdateOnOff {
            on: self.state.settings.alarms_on,
        });
        self.fx.push(SideEffect::UpdateNextAlarmInfo { text });
        self.fx.push(SideEffect::ShowStatus { at, kind });
    }
}
