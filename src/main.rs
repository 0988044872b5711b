//! Delve session broker CLI
//!
//! Each invocation talks to a background daemon that owns the Delve
//! backends, so sessions outlive the command that started them.

use clap::Parser;
use commands::Commands;
use delve_broker::common::logging;
use delve_broker::{cli, commands, daemon};

#[derive(Parser)]
#[command(name = "delve-broker", about = "Broker for headless Delve debug sessions")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Daemon => {
            if let Some(path) = logging::init_daemon() {
                tracing::info!(log = %path.display(), "Daemon logging to file");
            }
            daemon::run().await
        }
        command => {
            logging::init_cli();
            cli::dispatch(command).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
