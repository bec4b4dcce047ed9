/*!
Activity tracker for the analytics platform
*/

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use tracing::info;

mod core;

use crate::core::tracker::{
    ShutdownHandler, create_default_tracker, create_tracker_from_config_file,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("Activity Tracker")
        .version("2.0.0")
        .about("Records platform API activity as a human-readable audit log")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the tracker configuration file (TOML)")
                .value_name("PATH"),
        )
        .arg(
            Arg::new("replay")
                .long("replay")
                .help("Process the whole event log once, then exit")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .or_else(|| {
            let default = dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("activity-tracker/config.toml");
            default.exists().then_some(default)
        });

    let mut tracker = match config_path {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            create_tracker_from_config_file(path).await?
        }
        None => create_default_tracker().await?,
    };

    if matches.get_flag("replay") {
        tracker.run_pending_updates().await?;
        tracker.replay().await?;
        let stats = tracker.stats();
        info!(
            "Replay done: {} events processed, {} activities recorded",
            stats.events_processed, stats.activities_recorded
        );
        return ShutdownHandler::new(tracker).shutdown().await;
    }

    tokio::select! {
        result = tracker.start() => {
            if let Err(e) = result {
                eprintln!("Tracker error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown");
        }
    }

    let stats = tracker.stats();
    info!(
        "Session: {} events processed, {} activities recorded over {}s",
        stats.events_processed, stats.activities_recorded, stats.uptime_seconds
    );

    ShutdownHandler::new(tracker).shutdown().await
}
