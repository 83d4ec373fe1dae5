//! Event loop glue.
//!
//! [`App`] owns the [`AppState`], the store and the collaborators. It feeds
//! events to [`handle_event`], executes the returned side effects and runs
//! the deferred timers the machine asked for. Side effects that produce new
//! information (an accepted wake id, a failed subscription) are turned back
//! into events and dispatched in order.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::deferred::DeferredQueue;
use crate::events::{Event, PendingWakes, SideEffect, TimerKind, WakeId, WakeReason, WakeSlot};
use crate::machine::{handle_event, AlarmPhase, AppState, ACCEL_RATE_HZ};
use crate::platform::{Accelerometer, Clock, Display, Haptics, WakeScheduler};
use crate::scheduler::schedule_with_retry;
use crate::storage::Store;
use crate::time::TimeContext;

/// The hardware-facing half of the application.
pub struct Collaborators {
    pub clock: Box<dyn Clock>,
    pub wakes: Box<dyn WakeScheduler>,
    pub haptics: Box<dyn Haptics>,
    pub accel: Box<dyn Accelerometer>,
    pub display: Box<dyn Display>,
}

pub struct App {
    state: AppState,
    store: Box<dyn Store>,
    io: Collaborators,
    timers: DeferredQueue<TimerKind>,
    exit_requested: bool,
    seed: Option<u64>,
}

impl App {
    /// Loads persisted state. Call [`App::launch`] before dispatching anything else.
    pub fn new(store: Box<dyn Store>, io: Collaborators) -> Self {
        Self::build(store, io, None)
    }

    /// Like [`App::new`] with a fixed stop-code seed.
    pub fn with_seed(store: Box<dyn Store>, io: Collaborators, seed: u64) -> Self {
        Self::build(store, io, Some(seed))
    }

    fn build(store: Box<dyn Store>, io: Collaborators, seed: Option<u64>) -> Self {
        let state = load_state(store.as_ref(), seed);
        Self {
            state,
            store,
            io,
            timers: DeferredQueue::new(),
            exit_requested: false,
            seed,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn phase(&self) -> AlarmPhase {
        self.state.phase()
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// The machine asked to exit; no timers run until the next launch.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn next_timer_due(&self) -> Option<DateTime<Utc>> {
        if self.exit_requested {
            return None;
        }
        self.timers.next_due()
    }

    pub fn timer_pending(&self, kind: TimerKind) -> bool {
        self.timers.is_pending(kind)
    }

    pub fn context(&self) -> TimeContext {
        self.io.clock.context()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Starts the app, optionally because `wake` was delivered.
    pub fn launch(&mut self, wake: Option<(WakeId, WakeReason)>) {
        let records = self.state.runtime.wakes;
        let still_pending = |slot: WakeSlot| {
            records
                .get(slot)
                .is_some_and(|r| self.io.wakes.query(r.id).is_some())
        };
        let pending = PendingWakes {
            primary: still_pending(WakeSlot::Primary),
            get_out_of_bed: still_pending(WakeSlot::GetOutOfBed),
            dst_check: still_pending(WakeSlot::DstCheck),
        };
        info!(?pending, ?wake, phase = self.state.phase().name(), "launching");
        self.dispatch(Event::Launched { pending });
        if let Some((id, reason)) = wake {
            self.dispatch(Event::WakeFired { id, reason });
        }
    }

    /// Simulates a process restart: in-memory state is dropped and reloaded
    /// from the store before launching again.
    pub fn relaunch(&mut self, wake: Option<(WakeId, WakeReason)>) {
        debug!("restarting from persisted state");
        self.io.haptics.cancel();
        self.io.accel.unsubscribe();
        self.timers = DeferredQueue::new();
        self.exit_requested = false;
        self.state = load_state(self.store.as_ref(), self.seed);
        self.launch(wake);
    }

    /// Dispatches `event` and everything its side effects feed back.
    pub fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let ctx = self.io.clock.context();
            let effects = handle_event(&mut self.state, &ctx, event);
            for effect in effects {
                self.execute(effect, &ctx, &mut queue);
            }
        }
    }

    /// Fires every timer due at the clock's current time.
    pub fn run_due_timers(&mut self) {
        while !self.exit_requested {
            let now = self.io.clock.now();
            let Some(kind) = self.timers.pop_due(now) else {
                break;
            };
            self.dispatch(Event::TimerFired { kind });
        }
    }

    /// Flushes a pending debounced settings write.
    pub fn shutdown(&mut self) {
        if self.timers.is_pending(TimerKind::PersistSettings) {
            self.timers.cancel(TimerKind::PersistSettings);
            self.persist_settings();
        }
        self.persist_state();
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn execute(&mut self, effect: SideEffect, ctx: &TimeContext, queue: &mut VecDeque<Event>) {
        match effect {
            SideEffect::ScheduleWake { slot, request } => {
                let may_cancel_all = slot == WakeSlot::Primary;
                match schedule_with_retry(self.io.wakes.as_mut(), &request, may_cancel_all, ctx.now) {
                    Ok(id) => {
                        let at = self.io.wakes.query(id).unwrap_or(request.at);
                        info!(?slot, reason = ?request.reason, %at, id = id.0, "wake scheduled");
                        queue.push_back(Event::WakeScheduled {
                            slot,
                            id,
                            reason: request.reason,
                            at,
                        });
                    }
                    Err(error) => queue.push_back(Event::WakeFailed { slot, error }),
                }
            }
            SideEffect::CancelWake { id } => {
                debug!(id = id.0, "cancelling wake");
                self.io.wakes.cancel(id);
            }
            SideEffect::PersistState => self.persist_state(),
            SideEffect::PersistAlarms => {
                if let Err(e) = self.store.write_alarms(&self.state.alarms) {
                    error!(error = %e, "failed to persist alarms");
                }
            }
            SideEffect::PersistSettings => {
                self.timers.cancel(TimerKind::PersistSettings);
                self.persist_settings();
            }
            SideEffect::StartTimer { kind, after_ms } => self.timers.schedule(kind, ctx.now, after_ms),
            SideEffect::CancelTimer { kind } => self.timers.cancel(kind),
            SideEffect::Vibrate { segments } => self.io.haptics.vibrate(&segments),
            SideEffect::CancelVibration => self.io.haptics.cancel(),
            SideEffect::LightPulse => self.io.haptics.light_pulse(),
            SideEffect::SubscribeAccel => {
                if let Err(e) = self.io.accel.subscribe(ACCEL_RATE_HZ) {
                    warn!(error = %e, "accelerometer subscription failed");
                    queue.push_back(Event::AccelUnavailable);
                }
            }
            SideEffect::UnsubscribeAccel => self.io.accel.unsubscribe(),
            SideEffect::UpdateClock => self.io.display.update_clock(ctx),
            SideEffect::UpdateOnOff { on } => self.io.display.update_onoff(on),
            SideEffect::UpdateNextAlarmInfo { text } => self.io.display.update_next_alarm_info(&text),
            SideEffect::ShowAlarmActive { active, goob } => {
                self.io.display.show_alarm_active(active, goob)
            }
            SideEffect::ShowStatus { at, kind } => self.io.display.show_status(at, kind),
            SideEffect::ShowStopCode { sequence, entered } => {
                self.io.display.show_stop_code(&sequence, entered)
            }
            SideEffect::ShowMessage { text } => self.io.display.show_message(&text),
            SideEffect::Exit => {
                info!("exit requested");
                self.exit_requested = true;
            }
        }
    }

    fn persist_state(&mut self) {
        if let Err(e) = self.store.write_state(&self.state.runtime) {
            error!(error = %e, "failed to persist runtime state");
        }
    }

    fn persist_settings(&mut self) {
        if let Err(e) = self.store.write_settings(&self.state.settings) {
            error!(error = %e, "failed to persist settings");
        }
    }
}

fn load_state(store: &dyn Store, seed: Option<u64>) -> AppState {
    let settings = store.read_settings();
    let alarms = store.read_alarms();
    let runtime = store.read_state();
    match seed {
        Some(seed) => AppState::with_seed(settings, alarms, runtime, seed),
        None => AppState::new(settings, alarms, runtime),
    }
}
