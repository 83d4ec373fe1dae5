use clap::Subcommand;
use gentlewake_core::{Database, Settings, Store};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a settings value
    Get {
        /// Settings key (e.g. "snooze_delay", "one_time_alarm.hour")
        key: String,
    },
    /// Set a settings value
    Set {
        /// Settings key
        key: String,
        /// New value
        value: String,
    },
    /// List all settings
    List {
        #[arg(long)]
        json: bool,
    },
    /// Reset settings to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open()?;
    match action {
        ConfigAction::Get { key } => {
            let settings = db.read_settings();
            match settings.get(&key) {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("unknown key: {key}");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut settings = db.read_settings();
            settings.set(&key, &value)?;
            db.write_settings(&settings)?;
            println!("ok");
        }
        ConfigAction::List { json } => {
            let settings = db.read_settings();
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                for (key, value) in settings.entries() {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigAction::Reset => {
            db.write_settings(&Settings::default())?;
            println!("settings reset to defaults");
        }
    }
    Ok(())
}
