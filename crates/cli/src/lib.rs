pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use showings_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "showings",
    about = "Showings operator CLI",
    long_about = "Inspect configuration, check readiness, and replay voice-agent function calls offline.",
    after_help = "Examples:\n  showings doctor --json\n  showings config\n  showings resolve call.json\n  showings simulate call.json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to showings.toml (defaults to ./showings.toml or ./config/showings.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, credential files, timezones, and default-tenant routing")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Resolve tenant and operation for a webhook payload without calling any provider")]
    Resolve {
        #[arg(help = "JSON file holding a webhook request body")]
        payload: PathBuf,
    },
    #[command(about = "Dispatch a webhook payload against an empty in-memory calendar")]
    Simulate {
        #[arg(help = "JSON file holding a webhook request body")]
        payload: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::Resolve { payload } => commands::resolve::run(options, &payload),
        Command::Simulate { payload } => commands::simulate::run(options, &payload),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
