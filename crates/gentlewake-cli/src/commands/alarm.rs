use chrono::NaiveDate;
use clap::Subcommand;
use gentlewake_core::time::{day_name, WEEKDAYS};
use gentlewake_core::{DayAlarm, Event};

use super::session::Session;

#[derive(Subcommand)]
pub enum AlarmAction {
    /// List the weekly table
    List {
        #[arg(long)]
        json: bool,
    },
    /// Set one weekday's alarm
    Set {
        /// Day name ("mon", "tuesday") or index (0 = Sunday)
        day: String,
        /// Time as HH:MM
        time: String,
    },
    /// Disable one weekday's alarm
    Off {
        day: String,
    },
    /// Set every day to HH:MM, or "off"
    All {
        time: String,
    },
    /// Set the one-time alarm to HH:MM, or "off"
    OneTime {
        time: String,
    },
    /// Skip alarms until a date (YYYY-MM-DD), or "off"
    Skip {
        until: String,
    },
}

pub fn run(action: AlarmAction, is_24h: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::open(is_24h)?;
    match action {
        AlarmAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&session.state.alarms)?);
            } else {
                for (day, alarm) in session.state.alarms.iter() {
                    println!("{:<10} {}", day_name(day), alarm.label(is_24h));
                }
                let one_time = session.state.settings.one_time_alarm;
                if one_time.enabled {
                    println!("{:<10} {}", "One-time", one_time.label(is_24h));
                }
            }
        }
        AlarmAction::Set { day, time } => {
            let day = parse_day(&day)?;
            let alarm = parse_time(&time)?;
            session.apply(Event::SetDayAlarm { day, alarm })?;
            println!("{} set to {}", day_name(day), alarm.label(is_24h));
        }
        AlarmAction::Off { day } => {
            let day = parse_day(&day)?;
            let current = session.state.alarms.get(day).copied().unwrap_or_default();
            session.apply(Event::SetDayAlarm {
                day,
                alarm: current.disabled(),
            })?;
            println!("{} off", day_name(day));
        }
        AlarmAction::All { time } => {
            let alarm = if time.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(parse_time(&time)?)
            };
            for day in 0..WEEKDAYS.len() {
                let next = match alarm {
                    Some(a) => a,
                    None => session.state.alarms.get(day).copied().unwrap_or_default().disabled(),
                };
                session.apply(Event::SetDayAlarm { day, alarm: next })?;
            }
            println!("ok");
        }
        AlarmAction::OneTime { time } => {
            let alarm = if time.eq_ignore_ascii_case("off") {
                session.state.settings.one_time_alarm.disabled()
            } else {
                parse_time(&time)?
            };
            session.apply(Event::SetOneTimeAlarm { alarm })?;
            println!("one-time alarm {}", alarm.label(is_24h));
        }
        AlarmAction::Skip { until } => {
            let until = if until.eq_ignore_ascii_case("off") {
                None
            } else {
                let date = NaiveDate::parse_from_str(&until, "%Y-%m-%d")?;
                Some(session.ctx.midnight(date))
            };
            session.apply(Event::SetSkipUntil { until })?;
            match session.state.settings.skip_until {
                Some(at) => println!("skipping until {}", session.ctx.local_of(at).format("%a, %b %-d")),
                None => println!("skip cleared"),
            }
        }
    }
    Ok(())
}

pub fn parse_day(input: &str) -> Result<usize, String> {
    if let Ok(index) = input.parse::<usize>() {
        return if index < 7 {
            Ok(index)
        } else {
            Err(format!("day index {index} out of range (0 = Sunday .. 6 = Saturday)"))
        };
    }
    let lower = input.to_ascii_lowercase();
    (0..7)
        .find(|i| {
            let name = day_name(*i).to_ascii_lowercase();
            lower.len() >= 3 && name.starts_with(&lower)
        })
        .ok_or_else(|| format!("unknown day '{input}'"))
}

/// Parses HH:MM into an enabled alarm.
pub fn parse_time(input: &str) -> Result<DayAlarm, String> {
    let (h, m) = input
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got '{input}'"))?;
    let hour = h.trim().parse::<u8>().map_err(|e| format!("bad hour '{h}': {e}"))?;
    let minute = m.trim().parse::<u8>().map_err(|e| format!("bad minute '{m}': {e}"))?;
    DayAlarm::at(hour, minute).map_err(|e| e.to_string())
}
