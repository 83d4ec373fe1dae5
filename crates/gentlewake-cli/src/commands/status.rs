use serde_json::json;

use super::session::Session;

pub fn run(is_24h: bool) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open(is_24h)?;
    let phase = session.state.phase();
    let status = json!({
        "phase": phase.name(),
        "alarms_on": session.state.settings.alarms_on,
        "runtime": session.state.runtime,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
