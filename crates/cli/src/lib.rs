pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "pricewise",
    about = "Pricewise configurator operator CLI",
    long_about = "Prepare the catalog database, inspect configuration, score questionnaire answers, and smoke-test a full configurator session.",
    after_help = "Examples:\n  pricewise migrate\n  pricewise seed\n  pricewise recommend --answers answers.toml\n  pricewise smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the default tier, level and service catalog (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution"
    )]
    Config,
    #[command(about = "Score a questionnaire answers file and print the recommendation")]
    Recommend {
        #[arg(long, help = "TOML file with a `kind` of tier, level or services plus answers")]
        answers: PathBuf,
    },
    #[command(about = "Drive a full configurator session against a scratch database")]
    Smoke,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    logging::init_from_env();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Recommend { answers } => commands::recommend::run(&answers),
        Command::Smoke => commands::smoke::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
