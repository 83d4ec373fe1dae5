//! One-shot access to the persisted app state.
//!
//! Commands load the store into an [`AppState`], push one event through the
//! machine and write back whatever it asked to persist. Wake and display
//! effects are dropped: the host does not own the watch's wake-ups.

use gentlewake_core::platform::SystemClock;
use gentlewake_core::{handle_event, AppState, Clock, Database, Event, SideEffect, Store, TimeContext};
use tracing::debug;

pub struct Session {
    pub db: Database,
    pub state: AppState,
    pub ctx: TimeContext,
}

impl Session {
    pub fn open(is_24h: bool) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Database::open()?;
        let state = AppState::new(db.read_settings(), db.read_alarms(), db.read_state());
        let ctx = SystemClock { is_24h }.context();
        Ok(Self { db, state, ctx })
    }

    /// Applies `event`; a message shown by the machine becomes the error.
    pub fn apply(&mut self, event: Event) -> Result<(), Box<dyn std::error::Error>> {
        let effects = handle_event(&mut self.state, &self.ctx, event);
        let mut settings_dirty = false;
        for effect in effects {
            match effect {
                SideEffect::ShowMessage { text } => return Err(text.into()),
                SideEffect::PersistSettings => settings_dirty = true,
                SideEffect::StartTimer {
                    kind: gentlewake_core::TimerKind::PersistSettings,
                    ..
                } => settings_dirty = true,
                SideEffect::PersistAlarms => self.db.write_alarms(&self.state.alarms)?,
                SideEffect::PersistState => self.db.write_state(&self.state.runtime)?,
                other => debug!(?other, "effect not applied on the host"),
            }
        }
        if settings_dirty {
            self.db.write_settings(&self.state.settings)?;
        }
        Ok(())
    }
}
