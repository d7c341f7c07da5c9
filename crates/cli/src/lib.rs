pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use plantdesk_core::config::{AppConfig, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "plantdesk",
    about = "Plantdesk operator CLI",
    long_about = "Operate plantdesk runtime readiness, migrations, demo fixtures, and smoke validation.",
    after_help = "Examples:\n  plantdesk doctor --json\n  plantdesk migrate\n  plantdesk smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset into the configured database")]
    Seed,
    #[command(about = "Run an end-to-end workflow pass against a throwaway database")]
    Smoke,
    #[command(about = "Validate config, database connectivity, and mailer readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // A second init (tests, repeated calls) is fine to ignore.
    let result = match config.logging.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_max_level(log_level)
            .json()
            .try_init(),
    };
    let _ = result;
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(Default::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Smoke => commands::smoke::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
