pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ledgerbot_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "ledgerbot",
    about = "Ledgerbot operator CLI",
    long_about = "Operate the ledger assistant: readiness checks, migrations, demo data, config inspection, and one-shot chat.",
    after_help = "Examples:\n  ledgerbot doctor --json\n  ledgerbot seed\n  ledgerbot chat --conversation demo \"vendí 2 pulseras doradas\""
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a ledgerbot.toml file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo catalog and opening stock, then verify it")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, language-service readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Send one message through the full pipeline and print the reply")]
    Chat {
        #[arg(long, default_value = "cli", help = "Conversation id used for rolling context")]
        conversation: String,
        #[arg(help = "Message text, in Spanish or English")]
        message: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        config_path: cli.config.clone(),
        require_file: cli.config.is_some(),
        ..LoadOptions::default()
    };

    let result = match cli.command {
        Command::Start => commands::start::run(&options),
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(&options, json) }
        }
        Command::Chat { conversation, message } => {
            commands::chat::run(&options, &conversation, &message)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
