//! Integration tests for restart recovery and on-disk persistence.

use chrono::{DateTime, Duration, TimeZone, Utc};
use gentlewake_core::events::PressKind;
use gentlewake_core::simulation::{ManualClock, SimWakeScheduler, Simulation};
use gentlewake_core::storage::config::DstCheckDay;
use gentlewake_core::{
    AlarmPhase, Button, Database, DayAlarm, Event, Settings, Store, WakeId, WakeReason,
    WakeScheduler, WeeklyAlarmTable,
};
use indoc::indoc;

fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, h, m, s).unwrap()
}

fn monday_seven() -> WeeklyAlarmTable {
    let mut alarms = WeeklyAlarmTable::default();
    alarms.set(1, DayAlarm::at(7, 0).unwrap()).unwrap();
    alarms
}

fn ringing_sim() -> Simulation {
    let mut sim = Simulation::new(Settings::default(), monday_seven(), at(4, 6, 0, 0), 3).unwrap();
    sim.launch();
    sim.advance_to(at(4, 7, 0, 10));
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
    sim
}

#[test]
fn test_crash_while_ringing_resumes_vibration() {
    let mut sim = ringing_sim();
    let before = sim.haptics.vibrations();
    sim.crash_and_relaunch();
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
    assert!(sim.haptics.vibrations() > before);
}

#[test]
fn test_crash_while_snoozing_keeps_pending_snooze() {
    let mut sim = ringing_sim();
    sim.press(Button::Select, PressKind::Single);
    sim.advance(Duration::seconds(1));
    sim.crash_and_relaunch();
    assert_eq!(sim.app.phase(), AlarmPhase::Snoozing);

    sim.advance_to(at(4, 7, 9, 11));
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
}

#[test]
fn test_lost_snooze_wake_rings_on_restart() {
    let mut sim = ringing_sim();
    sim.press(Button::Select, PressKind::Single);
    sim.advance(Duration::seconds(1));

    // The watch was off and the OS dropped the wake.
    sim.wakes.clone().cancel_all();
    sim.clock.set(at(4, 7, 30, 0));
    sim.crash_and_relaunch();
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
}

#[test]
fn test_stale_wake_is_ignored() {
    let mut sim = Simulation::new(Settings::default(), monday_seven(), at(4, 6, 0, 0), 3).unwrap();
    sim.launch();
    sim.advance(Duration::seconds(1));
    sim.send(Event::WakeFired {
        id: WakeId(999),
        reason: WakeReason::Alarm,
    });
    assert!(matches!(sim.app.phase(), AlarmPhase::Idle { .. }));
    assert_eq!(sim.haptics.vibrations(), 0);
}

#[test]
fn test_dismissed_alarm_stays_dismissed_after_restart() {
    let mut sim = ringing_sim();
    sim.press(Button::Select, PressKind::Double);
    sim.advance(Duration::seconds(1));
    sim.crash_and_relaunch();
    sim.advance(Duration::seconds(1));
    let primary = sim.app.state().runtime.wakes.primary.unwrap();
    assert_eq!(primary.at, at(11, 7, 0, 0));
}

#[test]
fn test_database_round_trip_through_app() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gentlewake.db");
    {
        let mut db = Database::open_at(&path).unwrap();
        db.write_alarms(&monday_seven()).unwrap();
    }

    let db = Database::open_at(&path).unwrap();
    let mut sim = Simulation::with_store(
        Box::new(db),
        ManualClock::new(at(4, 6, 0, 0)),
        SimWakeScheduler::new(),
        1,
    );
    sim.launch();
    sim.send(Event::UpdateSettings {
        settings: Box::new(Settings {
            snooze_delay: 4,
            ..Settings::default()
        }),
    });
    // Settings writes are debounced.
    assert_eq!(Database::open_at(&path).unwrap().read_settings().snooze_delay, 9);
    sim.advance(Duration::seconds(2));
    assert_eq!(Database::open_at(&path).unwrap().read_settings().snooze_delay, 4);

    let reopened = Database::open_at(&path).unwrap();
    let runtime = reopened.read_state();
    assert_eq!(runtime.next_alarm_at, Some(at(4, 7, 0, 0)));
    assert_eq!(runtime.wakes.primary.unwrap().reason, WakeReason::Alarm);
}

#[test]
fn test_shutdown_flushes_pending_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gentlewake.db");
    let db = Database::open_at(&path).unwrap();
    let mut sim = Simulation::with_store(
        Box::new(db),
        ManualClock::new(at(4, 6, 0, 0)),
        SimWakeScheduler::new(),
        1,
    );
    sim.launch();
    sim.send(Event::UpdateSettings {
        settings: Box::new(Settings {
            easy_light: true,
            ..Settings::default()
        }),
    });
    sim.app.shutdown();
    assert!(Database::open_at(&path).unwrap().read_settings().easy_light);
}

#[test]
fn test_legacy_settings_blob_is_upgraded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gentlewake.db");
    let db = Database::open_at(&path).unwrap();
    db.kv_set(
        "settings",
        indoc! {r#"
            {
              "version": 1,
              "data": {
                "snooze_delay": 7,
                "smart_alarm": true,
                "monitor_period": 0,
                "dst_check_day": 6
              }
            }
        "#},
    )
    .unwrap();
    db.kv_set("alarms", r#"{"version": 1, "data": "garbage"}"#).unwrap();

    let settings = db.read_settings();
    assert_eq!(settings.snooze_delay, 7);
    assert_eq!(settings.monitor_period, 5);
    assert_eq!(settings.dst_check_day, Some(DstCheckDay::Friday));
    assert_eq!(db.read_alarms(), WeeklyAlarmTable::default());

    // An app over the upgraded blob plans the monitor wake five minutes ahead.
    let mut db = db;
    db.write_alarms(&monday_seven()).unwrap();
    let mut sim = Simulation::with_store(
        Box::new(db),
        ManualClock::new(at(4, 6, 0, 0)),
        SimWakeScheduler::new(),
        1,
    );
    sim.launch();
    sim.advance(Duration::seconds(1));
    let primary = sim.app.state().runtime.wakes.primary.unwrap();
    assert_eq!(primary.reason, WakeReason::Monitor);
    assert_eq!(primary.at, at(4, 6, 55, 0));
}
