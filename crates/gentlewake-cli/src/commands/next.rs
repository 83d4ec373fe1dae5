use chrono::{DateTime, Utc};
use gentlewake_core::events::WakeRequest;
use gentlewake_core::scheduler::next_alarm_text;
use gentlewake_core::{plan_wakeups, NextAlarm, WakeSlot};
use serde::Serialize;

use super::session::Session;

#[derive(Serialize)]
struct NextReport {
    next: NextAlarm,
    alarm_at: Option<DateTime<Utc>>,
    info: String,
    wakes: Vec<PlannedWake>,
}

#[derive(Serialize)]
struct PlannedWake {
    slot: WakeSlot,
    #[serde(flatten)]
    request: WakeRequest,
}

pub fn run(json: bool, is_24h: bool) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(is_24h)?;
    let input = session.state.schedule_input();
    let plan = plan_wakeups(&input, &session.ctx);
    let report = NextReport {
        next: plan.next,
        alarm_at: plan.alarm_at,
        info: next_alarm_text(&input, &session.ctx),
        wakes: plan
            .requests()
            .map(|(slot, request)| PlannedWake {
                slot,
                request: request.clone(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{}", report.info);
    for wake in &report.wakes {
        let local = session.ctx.local_of(wake.request.at);
        println!(
            "  {:?} wake ({:?}) at {}",
            wake.slot,
            wake.request.reason,
            local.format("%a %Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
