pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use atelier_core::config::{AppConfig, LogFormat, LoadOptions};
use clap::{Parser, Subcommand};
use tracing::Level;

#[derive(Debug, Parser)]
#[command(
    name = "atelier",
    about = "Atelier quoting engine operator CLI",
    long_about = "Run migrations, inspect configuration, price entries, resolve closing payments \
                  and inspect promise state.",
    after_help = "Examples:\n  atelier migrate\n  atelier price --input entries.json\n  \
                  atelier promise-state --promise-id P-1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Price a set of billable entries against a pricing configuration")]
    Price {
        #[arg(long, help = "JSON file with `config`, `entries` and optional `mode`")]
        input: PathBuf,
    },
    #[command(about = "Resolve the closing payment plan for a quote's amounts")]
    Payment {
        #[arg(long, help = "JSON file with the payment input")]
        input: PathBuf,
    },
    #[command(about = "Resolve the current state of a promise from its stage and quotes")]
    PromiseState {
        #[arg(long, help = "Promise identifier")]
        promise_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Price { input } => commands::price::run(&input),
        Command::Payment { input } => commands::payment::run(&input),
        Command::PromiseState { promise_id } => commands::promise_state::run(&promise_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Installs the stderr subscriber so stdout carries only command payloads.
/// Configuration errors are left for the command itself to report.
pub fn init_logging() {
    let Ok(config) = AppConfig::load(LoadOptions::default()) else {
        return;
    };
    install_subscriber(&config);
}

fn install_subscriber(config: &AppConfig) {
    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        eprintln!("logging already initialised: {error}");
    }
}
