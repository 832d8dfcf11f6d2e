pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "procura",
    about = "Procura operator CLI",
    long_about = "Operate the procurement workflow engine: migrations, demo seeding, \
                  readiness checks, config inspection, and purchase-order backfill.",
    after_help = "Examples:\n  procura doctor --json\n  procura migrate\n  procura backfill-pos"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Provision one demo user profile per role (explicit, no signal hooks)")]
    Seed,
    #[command(about = "Validate config, database connectivity, schema and blob storage")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Inspect effective configuration values with secrets redacted")]
    Config,
    #[command(
        name = "backfill-pos",
        about = "Generate missing purchase orders for APPROVED requests (recovery path)"
    )]
    BackfillPos,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PROCURA_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (tests, embedding) is fine to ignore.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn run() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => commands::config::run(),
        Command::BackfillPos => commands::backfill::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
