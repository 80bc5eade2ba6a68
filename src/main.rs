use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use usage_watch::commands::{run_snapshot, run_watch, WatchOptions};
use usage_watch::config::Config;
use usage_watch::logging::init_logging;

#[derive(Parser)]
#[command(name = "usage-watch")]
#[command(about = "Watch Claude and Codex usage limits and get notified before you hit them")]
#[command(version)]
struct Cli {
    /// Config file to use instead of the search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll continuously and notify on threshold crossings and resets
    Watch {
        /// Refresh interval in seconds (5-120)
        #[arg(long, value_parser = clap::value_parser!(u64).range(5..=120))]
        interval: Option<u64>,
        /// Emit one JSON line per cycle
        #[arg(long)]
        json: bool,
    },
    /// Fetch current usage once and print it
    Snapshot {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Watch {
        interval: None,
        json: false,
    });
    let json = matches!(
        command,
        Commands::Watch { json: true, .. } | Commands::Snapshot { json: true }
    );

    let mut config = match Config::load_with(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => handle_error(e, json),
    };

    if let Commands::Watch {
        interval: Some(secs),
        ..
    } = command
    {
        config.polling.interval_secs = secs;
    }

    let _guard = init_logging(&config.logging, &config.paths.log_directory);

    let result = match command {
        Commands::Watch { interval, json } => {
            run_watch(
                config,
                WatchOptions {
                    config_path: cli.config,
                    interval_override: interval,
                    json_output: json,
                },
            )
            .await
        }
        Commands::Snapshot { json } => run_snapshot(&config, json).await,
        Commands::Config => config.to_toml().map(|toml| print!("{toml}")),
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) => handle_error(e, json),
    }
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{e:#}") }));
    } else {
        eprintln!("Error: {e:#}");
    }
    process::exit(1);
}
