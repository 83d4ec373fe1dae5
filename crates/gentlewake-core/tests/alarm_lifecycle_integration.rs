//! Integration tests for the alarm lifecycle.
//!
//! Drives a full `App` through the simulation harness: wakes are scheduled
//! against `SimWakeScheduler`, delivered in time order, and the resulting
//! phase, wakes and screen are checked.

use chrono::{DateTime, Duration, TimeZone, Utc};
use gentlewake_core::events::PressKind;
use gentlewake_core::scheduler::{compute_next_alarm, ScheduleInput};
use gentlewake_core::simulation::Simulation;
use gentlewake_core::storage::config::GoobMode;
use gentlewake_core::{
    AlarmPhase, Button, DayAlarm, NextAlarm, Settings, TimeContext, WakeReason, WeeklyAlarmTable,
};

fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, h, m, s).unwrap()
}

/// Monday 07:00 only.
fn monday_seven() -> WeeklyAlarmTable {
    let mut alarms = WeeklyAlarmTable::default();
    alarms.set(1, DayAlarm::at(7, 0).unwrap()).unwrap();
    alarms
}

fn sim(settings: Settings, start: DateTime<Utc>) -> Simulation {
    let mut sim = Simulation::new(settings, monday_seven(), start, 7).unwrap();
    sim.launch();
    sim
}

#[test]
fn test_smart_alarm_wakes_early_on_movement() {
    let settings = Settings {
        smart_alarm: true,
        monitor_period: 30,
        ..Settings::default()
    };
    let start = at(4, 6, 29, 59);

    let state_settings = settings.clone();
    let alarms = monday_seven();
    let runtime = Default::default();
    let input = ScheduleInput::new(&state_settings, &alarms, &runtime);
    assert_eq!(
        compute_next_alarm(&input, &TimeContext::utc(start)),
        NextAlarm::WeekdayIndex(1)
    );

    let mut sim = sim(settings, start);
    sim.advance(Duration::milliseconds(500));
    let primary = sim.app.state().runtime.wakes.primary.unwrap();
    assert_eq!(primary.reason, WakeReason::Monitor);
    assert_eq!(primary.at, at(4, 6, 30, 0));

    sim.advance_to(at(4, 6, 30, 0));
    assert_eq!(sim.app.phase(), AlarmPhase::Monitoring);
    assert!(sim.accel.is_subscribed());

    sim.advance_to(at(4, 6, 40, 0));
    let batch = sim.stir_batch();
    assert!(sim.feed(batch));
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
    assert!(sim.now() < at(4, 7, 0, 0));
    assert!(sim.haptics.vibrations() > 0);
}

#[test]
fn test_snooze_then_stop() {
    let mut sim = sim(Settings::default(), at(4, 6, 0, 0));
    sim.advance_to(at(4, 7, 0, 5));
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
    assert!(sim.display.screen().alarm_active);

    sim.press(Button::Select, PressKind::Single);
    assert_eq!(sim.app.phase(), AlarmPhase::Snoozing);
    sim.advance(Duration::seconds(1));
    let snooze = sim.app.state().runtime.wakes.primary.unwrap();
    assert_eq!(snooze.reason, WakeReason::Snooze);
    assert_eq!(snooze.at, at(4, 7, 9, 5));

    sim.advance_to(at(4, 7, 9, 6));
    assert_eq!(sim.app.phase(), AlarmPhase::Active);

    sim.press(Button::Down, PressKind::Double);
    assert!(matches!(sim.app.phase(), AlarmPhase::Idle { on: true }));
    sim.advance(Duration::seconds(1));
    let next = sim.app.state().runtime.wakes.primary.unwrap();
    assert_eq!(next.at, at(11, 7, 0, 0));
    assert_eq!(sim.display.screen().next_alarm_info, "Next: Mon 07:00");
}

#[test]
fn test_unattended_alarm_keeps_snoozing() {
    let mut sim = sim(Settings::default(), at(4, 6, 0, 0));
    sim.advance_to(at(4, 7, 5, 0));
    // The gentle pattern runs out after about two minutes and snoozes itself.
    assert_eq!(sim.app.phase(), AlarmPhase::Snoozing);
    assert_eq!(sim.app.state().runtime.snooze_count, 1);

    sim.advance_to(at(4, 7, 12, 0));
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
}

#[test]
fn test_unattended_alarm_resets_after_an_hour() {
    let mut sim = sim(Settings::default(), at(4, 6, 0, 0));
    sim.advance_to(at(4, 9, 30, 0));
    assert!(matches!(sim.app.phase(), AlarmPhase::Idle { .. }));
    let runtime = &sim.app.state().runtime;
    assert_eq!(runtime.last_reset_day, Some(at(4, 0, 0, 0).date_naive()));
    assert_eq!(runtime.snoozed_secs, 0);
}

#[test]
fn test_collision_shifts_wake_later() {
    let mut sim = Simulation::new(Settings::default(), monday_seven(), at(4, 6, 0, 0), 1).unwrap();
    sim.wakes.add_foreign(at(4, 7, 0, 30));
    sim.launch();
    sim.advance(Duration::seconds(1));

    let primary = sim.app.state().runtime.wakes.primary.unwrap();
    assert_eq!(primary.at, at(4, 7, 2, 0));
    assert!(sim.display.screen().messages.is_empty());

    sim.advance_to(at(4, 7, 2, 0));
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
}

#[test]
fn test_exhausted_retries_are_reported() {
    let mut sim = Simulation::new(Settings::default(), monday_seven(), at(4, 6, 0, 0), 1).unwrap();
    for minute in 0..=6 {
        sim.wakes.add_foreign(at(4, 7, minute, 0));
    }
    sim.launch();
    sim.advance(Duration::seconds(1));

    assert!(sim.app.state().runtime.wakes.primary.is_none());
    let messages = sim.display.screen().messages;
    assert!(messages.iter().any(|m| m.contains("Another app")), "{messages:?}");
}

#[test]
fn test_unknown_scheduling_error_suggests_reset() {
    let mut sim = Simulation::new(Settings::default(), monday_seven(), at(4, 6, 0, 0), 1).unwrap();
    sim.wakes.fail_with(Some(-3));
    sim.launch();
    sim.advance(Duration::seconds(1));
    let messages = sim.display.screen().messages;
    assert!(messages.iter().any(|m| m.contains("error -3") && m.contains("factory reset")));
}

#[test]
fn test_goob_swings_cancel_follow_up() {
    let settings = Settings {
        goob_mode: GoobMode::AfterStopPress,
        goob_monitor_period: 5,
        ..Settings::default()
    };
    let mut sim = sim(settings, at(4, 6, 0, 0));
    sim.advance_to(at(4, 7, 1, 0));
    sim.press(Button::Select, PressKind::Double);
    assert_eq!(sim.app.phase(), AlarmPhase::GooBMonitoring);
    sim.advance(Duration::seconds(1));
    assert!(sim.app.state().runtime.wakes.get_out_of_bed.is_some());

    let batch = sim.swing_batch();
    assert!(sim.feed(batch));
    assert!(matches!(sim.app.phase(), AlarmPhase::Idle { .. }));
    sim.advance(Duration::seconds(1));
    assert!(sim.app.state().runtime.wakes.get_out_of_bed.is_none());
    assert!(!sim.accel.is_subscribed());
    assert!(sim
        .wakes
        .pending()
        .iter()
        .all(|w| w.reason != WakeReason::GetOutOfBed));
}

#[test]
fn test_goob_deadline_rings_again() {
    let settings = Settings {
        goob_mode: GoobMode::AfterStopPress,
        goob_monitor_period: 5,
        ..Settings::default()
    };
    let mut sim = sim(settings, at(4, 6, 0, 0));
    sim.advance_to(at(4, 7, 1, 0));
    sim.press(Button::Select, PressKind::Double);
    sim.advance_to(at(4, 7, 6, 1));
    assert_eq!(sim.app.phase(), AlarmPhase::GooBActive);
    let screen = sim.display.screen();
    assert!(screen.alarm_active && screen.goob);
}

#[test]
fn test_sensor_failure_degrades_to_plain_alarm() {
    let settings = Settings {
        smart_alarm: true,
        ..Settings::default()
    };
    let mut sim = Simulation::new(settings, monday_seven(), at(4, 6, 0, 0), 1).unwrap();
    sim.accel.set_broken(true);
    sim.launch();
    sim.advance_to(at(4, 6, 35, 0));
    assert_eq!(sim.app.phase(), AlarmPhase::Monitoring);
    assert!(!sim.app.state().accel_available);
    assert!(sim
        .display
        .screen()
        .messages
        .iter()
        .any(|m| m.contains("Motion sensor unavailable")));

    sim.advance_to(at(4, 7, 0, 1));
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
}

#[test]
fn test_dst_check_reflects_new_offset() {
    // Sunday night before a Monday alarm.
    let mut sim = sim(Settings::default(), at(10, 2, 0, 0));
    sim.advance(Duration::seconds(1));
    assert_eq!(sim.app.state().runtime.wakes.primary.unwrap().at, at(11, 7, 0, 0));

    // Clocks spring forward an hour before the 03:00 check.
    sim.clock.set_offset(3600);
    sim.advance_to(at(10, 3, 0, 1));
    assert!(sim.fired.iter().any(|w| w.reason == WakeReason::DstCheck));
    assert!(sim.app.exit_requested());

    sim.advance_to(at(11, 6, 0, 1));
    assert_eq!(sim.app.phase(), AlarmPhase::Active);
    assert_eq!(sim.fired.last().unwrap().at, at(11, 6, 0, 0));
}

#[test]
fn test_toggle_and_skip_update_info_line() {
    let mut sim = sim(Settings::default(), at(4, 12, 0, 0));
    sim.press(Button::Up, PressKind::Single);
    assert_eq!(sim.display.screen().next_alarm_info, "Alarms disabled");
    assert!(!sim.display.screen().alarms_on);

    sim.press(Button::Up, PressKind::Single);
    sim.send(gentlewake_core::Event::SetSkipUntil {
        until: Some(at(14, 9, 0, 0)),
    });
    assert_eq!(sim.display.screen().next_alarm_info, "Skipping until Thu, Mar 14");
    sim.advance(Duration::seconds(1));
    assert_eq!(sim.app.state().runtime.wakes.primary.unwrap().at, at(18, 7, 0, 0));
}

#[test]
fn test_stop_just_before_snooze_wake_stays_stopped() {
    let mut sim = sim(Settings::default(), at(4, 6, 0, 0));
    sim.advance_to(at(4, 7, 0, 5));
    sim.press(Button::Select, PressKind::Single);
    sim.advance(Duration::seconds(1));
    assert_eq!(sim.app.state().runtime.wakes.primary.unwrap().at, at(4, 7, 9, 5));

    // Dismissed inside the re-arm delay of the snooze wake firing.
    sim.advance_to(at(4, 7, 9, 5) - Duration::milliseconds(100));
    sim.press(Button::Select, PressKind::Double);
    assert!(matches!(sim.app.phase(), AlarmPhase::Idle { on: true }));
    sim.advance(Duration::milliseconds(200));
    assert!(matches!(sim.app.phase(), AlarmPhase::Idle { on: true }));
    assert!(sim.fired.iter().all(|w| w.reason != WakeReason::Snooze));

    sim.advance(Duration::seconds(1));
    assert_eq!(sim.app.state().runtime.wakes.primary.unwrap().at, at(11, 7, 0, 0));
}

#[test]
fn test_stop_while_monitoring_cancels_alarm_wake() {
    let settings = Settings {
        smart_alarm: true,
        monitor_period: 30,
        ..Settings::default()
    };
    let mut sim = sim(settings, at(4, 6, 0, 0));
    sim.advance_to(at(4, 6, 30, 1));
    assert_eq!(sim.app.phase(), AlarmPhase::Monitoring);
    assert_eq!(
        sim.app.state().runtime.wakes.primary.unwrap().reason,
        WakeReason::Alarm
    );

    sim.advance_to(at(4, 7, 0, 0) - Duration::milliseconds(50));
    sim.press(Button::Down, PressKind::Double);
    sim.advance(Duration::seconds(1));
    assert!(matches!(sim.app.phase(), AlarmPhase::Idle { .. }));
    assert!(sim.fired.iter().all(|w| w.reason != WakeReason::Alarm));
    assert_eq!(sim.haptics.vibrations(), 0);
}
