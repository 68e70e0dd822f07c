//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Control CLI for replaying scenarios and checking configuration."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Parser, Subcommand};
use gridsafe_logging as logging;

mod check;
mod replay;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "GridSafe playback control utility",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Replay a scored scenario file and print the outcome summary")]
    Replay(replay::ReplayOptions),
    #[command(about = "Validate a configuration file")]
    CheckConfig(check::CheckOptions),
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Replay(options) => replay::run(options)?,
        Commands::CheckConfig(options) => check::run(options)?,
    }
    Ok(())
}
