use std::path::Path;

use gentlewake_core::simulation::Scenario;

pub fn run(path: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let scenario = Scenario::from_toml(&text)?;
    let report = scenario.run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("phase: {}", report.final_phase);
    println!("finished: {}", report.finished_at.to_rfc3339());
    println!("vibrations: {}", report.vibrations);
    for wake in &report.fired {
        println!("fired: {:?} at {}", wake.reason, wake.at.to_rfc3339());
    }
    for wake in &report.pending {
        println!("pending: {:?} at {}", wake.reason, wake.at.to_rfc3339());
    }
    for message in &report.screen.messages {
        println!("message: {message}");
    }
    Ok(())
}
