//! Locus: location request coordinator CLI.
//!
//! # Usage
//!
//! ```text
//! locus replay <scenario.yaml> [--home <dir>] [--table]
//! locus settings show [--home <dir>]
//! locus settings init [--home <dir>] [--force]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{replay::ReplayArgs, settings::SettingsCommand};

#[derive(Parser, Debug)]
#[command(
    name = "locus",
    version,
    about = "Replay location sessions against the request coordinator",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a YAML scenario on a simulated provider and print every reply.
    Replay(ReplayArgs),

    /// Inspect or write ~/.locus/settings.yaml.
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Replay(args) => args.run(),
        Commands::Settings { command } => commands::settings::run(command),
    }
}
