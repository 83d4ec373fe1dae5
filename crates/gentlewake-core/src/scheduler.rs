//! Next-alarm computation and wake-up planning.
//!
//! Everything here is a pure function of settings, the weekly table, the
//! persisted runtime flags and a [`TimeContext`], except
//! [`schedule_with_retry`] which drives a [`WakeScheduler`] through the
//! collision retry policy.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alarm::{DayAlarm, NextAlarm, WeeklyAlarmTable};
use crate::error::ScheduleError;
use crate::events::{WakeId, WakeReason, WakeRequest, WakeSlot};
use crate::machine::RuntimeState;
use crate::platform::WakeScheduler;
use crate::storage::Settings;
use crate::time::{weekday_index, TimeContext};

/// Shortest dynamic snooze.
pub const MIN_DYNAMIC_SNOOZE_SECS: i64 = 180;
/// Past-due wakes are pushed this far into the future.
pub const PAST_DUE_GRACE_SECS: i64 = 5;
/// Shift applied per retry after a range conflict.
pub const COLLISION_SHIFT_SECS: i64 = 60;

/// Everything the scheduler reads.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleInput<'a> {
    pub settings: &'a Settings,
    pub alarms: &'a WeeklyAlarmTable,
    pub runtime: &'a RuntimeState,
}

impl<'a> ScheduleInput<'a> {
    pub fn new(settings: &'a Settings, alarms: &'a WeeklyAlarmTable, runtime: &'a RuntimeState) -> Self {
        Self { settings, alarms, runtime }
    }

    fn reset_today(&self, ctx: &TimeContext) -> bool {
        self.runtime.last_reset_day == Some(ctx.today())
    }

    /// First instant at which `day`'s alarm may fire, scanning up to a week ahead.
    fn resolve_weekday(&self, day: usize, ctx: &TimeContext) -> Option<DateTime<Utc>> {
        let alarm = self.alarms.get(day).filter(|a| a.enabled)?;
        let start = if self.reset_today(ctx) { 1 } else { 0 };
        let skip = self.settings.skip_until;
        (start..=7)
            .map(|offset| ctx.today() + Duration::days(offset))
            .filter(|date| weekday_index(*date) == day)
            .map(|date| ctx.at_local(date, alarm.hour, alarm.minute))
            .find(|at| *at > ctx.now && skip.map_or(true, |s| *at >= s))
    }
}

/// Which alarm fires next.
///
/// The one-time alarm always wins. A skip date a week or more away yields
/// [`NextAlarm::SkipWeek`], resolved later by [`alarm_to_timestamp`].
pub fn compute_next_alarm(input: &ScheduleInput<'_>, ctx: &TimeContext) -> NextAlarm {
    let settings = input.settings;
    if !settings.alarms_on {
        return NextAlarm::None;
    }
    if settings.one_time_alarm.enabled {
        return NextAlarm::OneTime;
    }
    if let Some(skip) = settings.skip_until {
        if ctx.days_until(skip) >= 7 {
            return if input.alarms.any_enabled() {
                NextAlarm::SkipWeek
            } else {
                NextAlarm::None
            };
        }
    }

    let start = if input.reset_today(ctx) { 1 } else { 0 };
    for offset in start..=7 {
        let date = ctx.today() + Duration::days(offset);
        let day = weekday_index(date);
        let Some(alarm) = input.alarms.get(day).filter(|a| a.enabled) else {
            continue;
        };
        let at = ctx.at_local(date, alarm.hour, alarm.minute);
        if at <= ctx.now {
            continue;
        }
        if settings.skip_until.is_some_and(|skip| at < skip) {
            continue;
        }
        return NextAlarm::WeekdayIndex(day);
    }
    NextAlarm::None
}

/// Resolves a [`NextAlarm`] to the UTC instant it fires at.
pub fn alarm_to_timestamp(
    input: &ScheduleInput<'_>,
    next: NextAlarm,
    ctx: &TimeContext,
) -> Option<DateTime<Utc>> {
    match next {
        NextAlarm::None => None,
        NextAlarm::OneTime => Some(one_time_instant(&input.settings.one_time_alarm, ctx)),
        NextAlarm::SkipWeek => {
            let skip = input.settings.skip_until?;
            let skip_date = ctx.local_date_of(skip);
            (0..=7)
                .map(|offset| skip_date + Duration::days(offset))
                .filter_map(|date| {
                    let alarm = input.alarms.get(weekday_index(date)).filter(|a| a.enabled)?;
                    Some(ctx.at_local(date, alarm.hour, alarm.minute))
                })
                .find(|at| *at >= skip && *at > ctx.now)
        }
        NextAlarm::WeekdayIndex(day) => input.resolve_weekday(day, ctx),
    }
}

/// Today's occurrence if still ahead, otherwise tomorrow's.
fn one_time_instant(alarm: &DayAlarm, ctx: &TimeContext) -> DateTime<Utc> {
    let today = ctx.at_local(ctx.today(), alarm.hour, alarm.minute);
    if today > ctx.now {
        today
    } else {
        ctx.at_local(ctx.today() + Duration::days(1), alarm.hour, alarm.minute)
    }
}

/// Snooze length in seconds for the given round.
///
/// With dynamic snooze each round shortens the delay, never below three minutes.
pub fn snooze_period(settings: &Settings, snooze_count: u32) -> i64 {
    let base = i64::from(settings.snooze_delay) * 60;
    if settings.dynamic_snooze {
        (base / i64::from(snooze_count.max(1))).max(MIN_DYNAMIC_SNOOZE_SECS)
    } else {
        base
    }
}

/// The wakes that should be outstanding right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakePlan {
    pub next: NextAlarm,
    /// Fire time of the next regular alarm, if any.
    pub alarm_at: Option<DateTime<Utc>>,
    pub primary: Option<WakeRequest>,
    pub get_out_of_bed: Option<WakeRequest>,
    pub dst_check: Option<WakeRequest>,
}

impl WakePlan {
    /// Requests in scheduling order: primary first, DST last.
    pub fn requests(&self) -> impl Iterator<Item = (WakeSlot, &WakeRequest)> {
        [
            (WakeSlot::Primary, self.primary.as_ref()),
            (WakeSlot::GetOutOfBed, self.get_out_of_bed.as_ref()),
            (WakeSlot::DstCheck, self.dst_check.as_ref()),
        ]
        .into_iter()
        .filter_map(|(slot, req)| req.map(|r| (slot, r)))
    }
}

fn clamp_past_due(at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if at <= now {
        now + Duration::seconds(PAST_DUE_GRACE_SECS)
    } else {
        at
    }
}

/// Plans the primary, Get-Out-of-Bed and DST-check wakes.
pub fn plan_wakeups(input: &ScheduleInput<'_>, ctx: &TimeContext) -> WakePlan {
    let settings = input.settings;
    let runtime = input.runtime;
    let next = compute_next_alarm(input, ctx);
    let alarm_at = alarm_to_timestamp(input, next, ctx);

    let primary = if runtime.snoozing || runtime.alarm_active || runtime.goob_active {
        let at = runtime.snooze_until.unwrap_or_else(|| {
            ctx.now + Duration::seconds(snooze_period(settings, runtime.snooze_count))
        });
        Some(WakeRequest {
            at: clamp_past_due(at, ctx.now),
            reason: WakeReason::Snooze,
            missed_alert: true,
        })
    } else {
        alarm_at.map(|at| {
            let (at, reason) = if settings.smart_alarm && !runtime.monitoring {
                (at - Duration::seconds(settings.monitor_lead_secs()), WakeReason::Monitor)
            } else {
                (at, WakeReason::Alarm)
            };
            WakeRequest {
                at: clamp_past_due(at, ctx.now),
                reason,
                missed_alert: true,
            }
        })
    };

    let get_out_of_bed = runtime
        .goob_deadline
        .filter(|deadline| *deadline > ctx.now)
        .map(|at| WakeRequest {
            at,
            reason: WakeReason::GetOutOfBed,
            missed_alert: true,
        });

    let dst_check = next_dst_check(settings, ctx).map(|at| WakeRequest {
        at,
        reason: WakeReason::DstCheck,
        missed_alert: false,
    });

    WakePlan {
        next,
        alarm_at,
        primary,
        get_out_of_bed,
        dst_check,
    }
}

/// Next occurrence of the configured DST-check weekday and hour.
pub fn next_dst_check(settings: &Settings, ctx: &TimeContext) -> Option<DateTime<Utc>> {
    let weekday = settings.dst_check_day?.weekday();
    (0..=7)
        .map(|offset| ctx.today() + Duration::days(offset))
        .filter(|date| date.weekday() == weekday)
        .map(|date| ctx.at_local(date, settings.dst_check_hour, 0))
        .find(|at| *at > ctx.now)
}

/// Schedules `request`, recovering from collisions.
///
/// On failure the wake is retried once after cancelling every wake this app
/// owns (only when `may_cancel_all`; callers schedule the primary wake first so
/// nothing else is lost). A persisting range conflict is then retried with the
/// target shifted away from `now` a minute per attempt.
pub fn schedule_with_retry(
    scheduler: &mut dyn WakeScheduler,
    request: &WakeRequest,
    may_cancel_all: bool,
    now: DateTime<Utc>,
) -> Result<WakeId, ScheduleError> {
    let mut last = match scheduler.schedule(request.at, request.reason, request.missed_alert) {
        Ok(id) => return Ok(id),
        Err(err) => err,
    };
    warn!(reason = ?request.reason, at = %request.at, error = %last, "wake scheduling failed");

    if may_cancel_all {
        scheduler.cancel_all();
        match scheduler.schedule(request.at, request.reason, request.missed_alert) {
            Ok(id) => {
                debug!(reason = ?request.reason, "scheduled after cancel_all");
                return Ok(id);
            }
            Err(err) => last = err,
        }
    }

    if !matches!(last, ScheduleError::RangeConflict { .. }) {
        return Err(last);
    }

    let step = if request.at >= now {
        COLLISION_SHIFT_SECS
    } else {
        -COLLISION_SHIFT_SECS
    };
    for attempt in 1..=i64::from(request.reason.max_shift_retries()) {
        let at = request.at + Duration::seconds(step * attempt);
        match scheduler.schedule(at, request.reason, request.missed_alert) {
            Ok(id) => {
                debug!(reason = ?request.reason, %at, attempt, "scheduled after shifting");
                return Ok(id);
            }
            Err(ScheduleError::RangeConflict { .. }) => continue,
            Err(err) => return Err(err),
        }
    }

    Err(ScheduleError::Exhausted {
        at: request.at,
        reason: request.reason,
    })
}

/// The info line under the clock.
pub fn next_alarm_text(input: &ScheduleInput<'_>, ctx: &TimeContext) -> String {
    let settings = input.settings;
    if !settings.alarms_on {
        return "Alarms disabled".to_string();
    }
    if !settings.one_time_alarm.enabled {
        if let Some(skip) = settings.skip_until.filter(|s| *s > ctx.now) {
            return format!(
                "Skipping until {}",
                ctx.local_of(skip).format("%a, %b %-d")
            );
        }
    }
    let next = compute_next_alarm(input, ctx);
    match alarm_to_timestamp(input, next, ctx) {
        Some(at) => {
            let local = ctx.local_of(at);
            let clock = if ctx.is_24h {
                local.format("%H:%M").to_string()
            } else {
                local.format("%-I:%M %p").to_string()
            };
            format!("Next: {} {}", local.format("%a"), clock)
        }
        None => "No alarms set".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2024-03-04 is a Monday.
    fn at(day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, h, m, s).unwrap()
    }

    fn table(days: &[(usize, u8, u8)]) -> WeeklyAlarmTable {
        let mut t = WeeklyAlarmTable::default();
        for &(d, h, m) in days {
            t.set(d, DayAlarm::at(h, m).unwrap()).unwrap();
        }
        t
    }

    #[test]
    fn alarms_off_yields_none() {
        let settings = Settings { alarms_on: false, ..Settings::default() };
        let alarms = table(&[(1, 7, 0)]);
        let rt = RuntimeState::default();
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        assert_eq!(compute_next_alarm(&input, &TimeContext::utc(at(4, 6, 0, 0))), NextAlarm::None);
    }

    #[test]
    fn today_later_wins() {
        let settings = Settings::default();
        let alarms = table(&[(1, 7, 0), (2, 6, 0)]);
        let rt = RuntimeState::default();
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        let ctx = TimeContext::utc(at(4, 6, 29, 59));
        assert_eq!(compute_next_alarm(&input, &ctx), NextAlarm::WeekdayIndex(1));
        assert_eq!(
            alarm_to_timestamp(&input, NextAlarm::WeekdayIndex(1), &ctx),
            Some(at(4, 7, 0, 0))
        );
    }

    #[test]
    fn passed_today_moves_to_next_enabled_day() {
        let settings = Settings::default();
        let alarms = table(&[(1, 7, 0), (3, 8, 30)]);
        let rt = RuntimeState::default();
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        let ctx = TimeContext::utc(at(4, 7, 0, 0));
        assert_eq!(compute_next_alarm(&input, &ctx), NextAlarm::WeekdayIndex(3));
        assert_eq!(
            alarm_to_timestamp(&input, NextAlarm::WeekdayIndex(3), &ctx),
            Some(at(6, 8, 30, 0))
        );
    }

    #[test]
    fn reset_today_resolves_to_next_week() {
        let settings = Settings::default();
        let alarms = table(&[(1, 7, 0)]);
        let ctx = TimeContext::utc(at(4, 6, 50, 0));
        let rt = RuntimeState {
            last_reset_day: Some(ctx.today()),
            ..RuntimeState::default()
        };
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        assert_eq!(compute_next_alarm(&input, &ctx), NextAlarm::WeekdayIndex(1));
        assert_eq!(
            alarm_to_timestamp(&input, NextAlarm::WeekdayIndex(1), &ctx),
            Some(at(11, 7, 0, 0))
        );
    }

    #[test]
    fn one_time_beats_weekly_and_rolls_to_tomorrow() {
        let settings = Settings {
            one_time_alarm: DayAlarm::at(5, 0).unwrap(),
            ..Settings::default()
        };
        let alarms = table(&[(1, 7, 0)]);
        let rt = RuntimeState::default();
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        let ctx = TimeContext::utc(at(4, 6, 0, 0));
        assert_eq!(compute_next_alarm(&input, &ctx), NextAlarm::OneTime);
        assert_eq!(alarm_to_timestamp(&input, NextAlarm::OneTime, &ctx), Some(at(5, 5, 0, 0)));
    }

    #[test]
    fn skip_exactly_seven_days_is_skip_week() {
        let ctx = TimeContext::utc(at(4, 12, 0, 0));
        let settings = Settings {
            skip_until: Some(at(11, 0, 0, 0)),
            ..Settings::default()
        };
        let alarms = table(&[(1, 7, 0), (2, 7, 0)]);
        let rt = RuntimeState::default();
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        assert_eq!(compute_next_alarm(&input, &ctx), NextAlarm::SkipWeek);
        // Monday the 11th at 07:00 is the first enabled alarm at/after the skip date.
        assert_eq!(alarm_to_timestamp(&input, NextAlarm::SkipWeek, &ctx), Some(at(11, 7, 0, 0)));
    }

    #[test]
    fn short_skip_suppresses_earlier_alarms() {
        let ctx = TimeContext::utc(at(4, 6, 0, 0));
        let settings = Settings {
            skip_until: Some(at(6, 0, 0, 0)),
            ..Settings::default()
        };
        let alarms = table(&[(1, 7, 0), (2, 7, 0), (3, 7, 0)]);
        let rt = RuntimeState::default();
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        assert_eq!(compute_next_alarm(&input, &ctx), NextAlarm::WeekdayIndex(3));
    }

    #[test]
    fn dynamic_snooze_shrinks_to_floor() {
        let settings = Settings {
            dynamic_snooze: true,
            snooze_delay: 9,
            ..Settings::default()
        };
        assert_eq!(snooze_period(&settings, 1), 540);
        assert_eq!(snooze_period(&settings, 2), 270);
        assert_eq!(snooze_period(&settings, 3), 180);
        assert_eq!(snooze_period(&settings, 10), 180);
        assert_eq!(snooze_period(&settings, 0), 540);

        let fixed = Settings { dynamic_snooze: false, ..settings };
        assert_eq!(snooze_period(&fixed, 5), 540);
    }

    #[test]
    fn smart_alarm_plans_monitor_wake() {
        let settings = Settings {
            smart_alarm: true,
            monitor_period: 30,
            dst_check_day: None,
            ..Settings::default()
        };
        let alarms = table(&[(1, 7, 0)]);
        let rt = RuntimeState::default();
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        let plan = plan_wakeups(&input, &TimeContext::utc(at(4, 6, 29, 59)));
        let primary = plan.primary.unwrap();
        assert_eq!(primary.reason, WakeReason::Monitor);
        assert_eq!(primary.at, at(4, 6, 30, 0));
        assert_eq!(plan.alarm_at, Some(at(4, 7, 0, 0)));
        assert!(plan.dst_check.is_none());
    }

    #[test]
    fn monitoring_plans_the_alarm_itself() {
        let settings = Settings { smart_alarm: true, ..Settings::default() };
        let alarms = table(&[(1, 7, 0)]);
        let rt = RuntimeState { monitoring: true, ..RuntimeState::default() };
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        let plan = plan_wakeups(&input, &TimeContext::utc(at(4, 6, 30, 0)));
        let primary = plan.primary.unwrap();
        assert_eq!(primary.reason, WakeReason::Alarm);
        assert_eq!(primary.at, at(4, 7, 0, 0));
    }

    #[test]
    fn past_due_monitor_is_clamped() {
        let settings = Settings { smart_alarm: true, monitor_period: 30, ..Settings::default() };
        let alarms = table(&[(1, 7, 0)]);
        let rt = RuntimeState::default();
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        let now = at(4, 6, 45, 0);
        let plan = plan_wakeups(&input, &TimeContext::utc(now));
        assert_eq!(plan.primary.unwrap().at, now + Duration::seconds(PAST_DUE_GRACE_SECS));
    }

    #[test]
    fn snoozing_plans_snooze_wake_and_goob() {
        let settings = Settings::default();
        let alarms = table(&[(1, 7, 0)]);
        let now = at(4, 7, 2, 0);
        let rt = RuntimeState {
            snoozing: true,
            snooze_count: 1,
            snooze_until: Some(at(4, 7, 11, 0)),
            goob_deadline: Some(at(4, 7, 5, 0)),
            ..RuntimeState::default()
        };
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        let plan = plan_wakeups(&input, &TimeContext::utc(now));
        assert_eq!(plan.primary.as_ref().unwrap().reason, WakeReason::Snooze);
        assert_eq!(plan.primary.as_ref().unwrap().at, at(4, 7, 11, 0));
        assert_eq!(plan.get_out_of_bed.as_ref().unwrap().at, at(4, 7, 5, 0));
        let slots: Vec<_> = plan.requests().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![WakeSlot::Primary, WakeSlot::GetOutOfBed, WakeSlot::DstCheck]);
    }

    #[test]
    fn dst_check_lands_on_configured_weekday() {
        let settings = Settings::default();
        // Monday noon; next Sunday 03:00 is the 10th.
        let ctx = TimeContext::utc(at(4, 12, 0, 0));
        assert_eq!(next_dst_check(&settings, &ctx), Some(at(10, 3, 0, 0)));
        let off = Settings { dst_check_day: None, ..Settings::default() };
        assert_eq!(next_dst_check(&off, &ctx), None);
    }

    #[test]
    fn info_text_variants() {
        let alarms = table(&[(2, 7, 0)]);
        let rt = RuntimeState::default();
        let ctx = TimeContext::utc(at(4, 12, 0, 0));

        let settings = Settings::default();
        let input = ScheduleInput::new(&settings, &alarms, &rt);
        assert_eq!(next_alarm_text(&input, &ctx), "Next: Tue 07:00");

        let twelve = TimeContext { is_24h: false, ..ctx };
        assert_eq!(next_alarm_text(&input, &twelve), "Next: Tue 7:00 AM");

        let off = Settings { alarms_on: false, ..Settings::default() };
        let input = ScheduleInput::new(&off, &alarms, &rt);
        assert_eq!(next_alarm_text(&input, &ctx), "Alarms disabled");

        let skipping = Settings { skip_until: Some(at(7, 0, 0, 0)), ..Settings::default() };
        let input = ScheduleInput::new(&skipping, &alarms, &rt);
        assert_eq!(next_alarm_text(&input, &ctx), "Skipping until Thu, Mar 7");

        let empty = WeeklyAlarmTable::default();
        let settings = Settings::default();
        let input = ScheduleInput::new(&settings, &empty, &rt);
        assert_eq!(next_alarm_text(&input, &ctx), "No alarms set");
    }

    /// Fails every attempt before `accept_on` with `error`.
    struct ScriptedScheduler {
        accept_on: Option<usize>,
        error: fn(DateTime<Utc>) -> ScheduleError,
        attempts: Vec<DateTime<Utc>>,
        cancel_alls: usize,
    }

    impl ScriptedScheduler {
        fn conflicting(accept_on: Option<usize>) -> Self {
            Self {
                accept_on,
                error: |at| ScheduleError::RangeConflict { at },
                attempts: Vec::new(),
                cancel_alls: 0,
            }
        }
    }

    impl WakeScheduler for ScriptedScheduler {
        fn schedule(
            &mut self,
            at: DateTime<Utc>,
            _reason: WakeReason,
            _missed_alert: bool,
        ) -> Result<WakeId, ScheduleError> {
            self.attempts.push(at);
            if self.accept_on == Some(self.attempts.len() - 1) {
                Ok(WakeId(1))
            } else {
                Err((self.error)(at))
            }
        }

        fn cancel(&mut self, _id: WakeId) {}

        fn cancel_all(&mut self) {
            self.cancel_alls += 1;
        }

        fn query(&self, _id: WakeId) -> Option<DateTime<Utc>> {
            None
        }
    }

    fn request(reason: WakeReason, when: DateTime<Utc>) -> WakeRequest {
        WakeRequest {
            at: when,
            reason,
            missed_alert: false,
        }
    }

    #[test]
    fn primary_retries_after_cancel_all_then_shifts() {
        let mut scheduler = ScriptedScheduler::conflicting(Some(3));
        let req = request(WakeReason::Alarm, at(4, 7, 0, 0));
        let id = schedule_with_retry(&mut scheduler, &req, true, at(4, 6, 0, 0)).unwrap();
        assert_eq!(id, WakeId(1));
        assert_eq!(scheduler.cancel_alls, 1);
        assert_eq!(
            scheduler.attempts,
            vec![at(4, 7, 0, 0), at(4, 7, 0, 0), at(4, 7, 1, 0), at(4, 7, 2, 0)]
        );
    }

    #[test]
    fn dst_check_shifts_ten_times_without_cancel_all() {
        let mut scheduler = ScriptedScheduler::conflicting(None);
        let req = request(WakeReason::DstCheck, at(10, 3, 0, 0));
        let err = schedule_with_retry(&mut scheduler, &req, false, at(4, 6, 0, 0)).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::Exhausted { at: at(10, 3, 0, 0), reason: WakeReason::DstCheck }
        );
        assert_eq!(scheduler.cancel_alls, 0);
        assert_eq!(scheduler.attempts.len(), 11);
        assert_eq!(scheduler.attempts.last(), Some(&at(10, 3, 10, 0)));
    }

    #[test]
    fn goob_wake_never_cancels_other_wakes() {
        let mut scheduler = ScriptedScheduler::conflicting(None);
        let req = request(WakeReason::GetOutOfBed, at(4, 7, 30, 0));
        assert!(schedule_with_retry(&mut scheduler, &req, false, at(4, 7, 0, 0)).is_err());
        assert_eq!(scheduler.cancel_alls, 0);
        assert_eq!(scheduler.attempts.len(), 6);
    }

    #[test]
    fn unknown_error_is_returned_without_shifting() {
        let mut scheduler = ScriptedScheduler {
            error: |_| ScheduleError::Unknown { code: -3 },
            ..ScriptedScheduler::conflicting(None)
        };
        let req = request(WakeReason::Alarm, at(4, 7, 0, 0));
        let err = schedule_with_retry(&mut scheduler, &req, true, at(4, 6, 0, 0)).unwrap_err();
        assert_eq!(err, ScheduleError::Unknown { code: -3 });
        assert_eq!(scheduler.cancel_alls, 1);
        assert_eq!(scheduler.attempts, vec![at(4, 7, 0, 0), at(4, 7, 0, 0)]);
    }

    #[test]
    fn past_target_shifts_earlier() {
        let mut scheduler = ScriptedScheduler::conflicting(Some(1));
        let req = request(WakeReason::Alarm, at(4, 7, 0, 0));
        schedule_with_retry(&mut scheduler, &req, false, at(4, 8, 0, 0)).unwrap();
        assert_eq!(scheduler.attempts, vec![at(4, 7, 0, 0), at(4, 6, 59, 0)]);
    }
}
