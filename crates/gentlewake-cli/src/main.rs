use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "gentlewake", version, about = "GentleWake alarm clock CLI")]
struct Cli {
    /// Show times in 12-hour style
    #[arg(long, global = true)]
    twelve_hour: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Weekly, one-time and skip alarms
    Alarm {
        #[command(subcommand)]
        action: commands::alarm::AlarmAction,
    },
    /// Settings management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Show the next alarm and the wakes that would be armed
    Next {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the persisted alarm phase
    Status,
    /// Run a TOML scenario against the simulated watch
    Simulate {
        /// Scenario file
        path: std::path::PathBuf,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("GENTLEWAKE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    let is_24h = !cli.twelve_hour;
    let result = match cli.command {
        Commands::Alarm { action } => commands::alarm::run(action, is_24h),
        Commands::Config { action } => commands::config::run(action),
        Commands::Next { json } => commands::next::run(json, is_24h),
        Commands::Status => commands::status::run(is_24h),
        Commands::Simulate { path, json } => commands::simulate::run(&path, json),
        Commands::Completions { shell } => {
            commands::completions::run(shell, &mut Cli::command());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
