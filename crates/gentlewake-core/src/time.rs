//! Wall-clock helpers.
//!
//! Every calculation works from one [`TimeContext`] captured at the start of
//! an event dispatch: the UTC instant, the local UTC offset in force at that
//! instant and the wearer's 12h/24h preference. Local wall-clock values are
//! derived from it and converted back to UTC with the same offset, so a DST
//! change only takes effect at the next recomputation (the DST-check wake
//! exists to force one).

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone,
    Utc, Weekday,
};

/// Weekdays in table order (index 0 is Sunday).
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// A snapshot of "now" as seen by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeContext {
    pub now: DateTime<Utc>,
    pub offset: FixedOffset,
    pub is_24h: bool,
}

impl TimeContext {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset, is_24h: bool) -> Self {
        Self { now, offset, is_24h }
    }

    /// A context at UTC with 24h display, convenient for tests.
    pub fn utc(now: DateTime<Utc>) -> Self {
        Self::new(now, utc_offset(), true)
    }

    pub fn local_now(&self) -> NaiveDateTime {
        self.local_of(self.now)
    }

    pub fn today(&self) -> NaiveDate {
        self.local_now().date()
    }

    /// Weekday index of today, Sunday = 0.
    pub fn today_index(&self) -> usize {
        weekday_index(self.today())
    }

    pub fn local_of(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }

    pub fn local_date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local_of(instant).date()
    }

    /// Converts a local wall-clock value to UTC using the captured offset.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(self.offset.local_minus_utc()))))
    }

    /// UTC instant of `hour:minute` local time on `date`.
    pub fn at_local(&self, date: NaiveDate, hour: u8, minute: u8) -> DateTime<Utc> {
        let time = NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), 0)
            .unwrap_or(NaiveTime::MIN);
        self.to_utc(date.and_time(time))
    }

    /// UTC instant of local midnight on `date`.
    pub fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.to_utc(date.and_time(NaiveTime::MIN))
    }

    /// Whole local days from today to the local date of `instant` (negative if past).
    pub fn days_until(&self, instant: DateTime<Utc>) -> i64 {
        day_diff(self.today(), self.local_date_of(instant))
    }
}

/// Weekday index with Sunday = 0.
pub fn weekday_index(date: NaiveDate) -> usize {
    date.weekday().num_days_from_sunday() as usize
}

/// Signed number of days from `from` to `to`.
pub fn day_diff(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

pub fn utc_offset() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap_or_else(|| Utc.fix())
}

/// Offset from a signed number of seconds east of UTC; out-of-range values clamp to UTC.
pub fn offset_from_secs(secs: i32) -> FixedOffset {
    FixedOffset::east_opt(secs).unwrap_or_else(utc_offset)
}

pub fn day_name(index: usize) -> &'static str {
    match index {
        0 => "Sunday",
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        _ => "",
    }
}

pub fn day_name_short(index: usize) -> &'static str {
    day_name(index).get(..3).unwrap_or("")
}

/// Formats `hour:minute` the way the clock face does: "7:05" / "19:05" in 24h
/// style, "7:05 AM" / "7:05 PM" otherwise.
pub fn format_clock(hour: u8, minute: u8, is_24h: bool) -> String {
    if is_24h {
        format!("{hour}:{minute:02}")
    } else {
        let (h12, suffix) = match hour {
            0 => (12, "AM"),
            1..=11 => (hour, "AM"),
            12 => (12, "PM"),
            _ => (hour - 12, "PM"),
        };
        format!("{h12}:{minute:02} {suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(offset_secs: i32) -> TimeContext {
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 23, 30, 0).unwrap();
        TimeContext::new(now, offset_from_secs(offset_secs), true)
    }

    #[test]
    fn local_date_follows_offset() {
        assert_eq!(ctx(0).today(), NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        // UTC+2 pushes 23:30 into the next day.
        assert_eq!(ctx(7200).today(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    }

    #[test]
    fn at_local_round_trips_through_offset() {
        let c = ctx(-5 * 3600);
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let at = c.at_local(date, 7, 0);
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap());
        assert_eq!(c.local_of(at).time(), NaiveTime::from_hms_opt(7, 0, 0).unwrap());
    }

    #[test]
    fn weekday_index_starts_on_sunday() {
        // 2024-03-03 was a Sunday.
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()), 0);
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()), 6);
    }

    #[test]
    fn midnight_is_local() {
        let c = ctx(3600);
        let midnight = c.midnight(c.today());
        assert_eq!(c.local_of(midnight).time(), NaiveTime::MIN);
        assert_eq!(c.local_date_of(midnight), c.today());
    }

    #[test]
    fn twelve_hour_formatting() {
        assert_eq!(format_clock(0, 5, false), "12:05 AM");
        assert_eq!(format_clock(12, 0, false), "12:00 PM");
        assert_eq!(format_clock(19, 30, false), "7:30 PM");
        assert_eq!(format_clock(7, 0, true), "7:00");
    }

    #[test]
    fn short_day_names() {
        assert_eq!(day_name_short(0), "Sun");
        assert_eq!(day_name_short(3), "Wed");
        assert_eq!(day_name_short(9), "");
    }
}
