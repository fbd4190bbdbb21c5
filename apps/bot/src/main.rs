use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use echobot_config::{load as load_config, BotConfig};
use echobot_runtime::{run_bot, shutdown_signal, telemetry, BotError, SessionHandle};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "echobot")]
#[command(about = "Matrix bot that joins invited rooms and echoes messages (runs by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and answer messages until interrupted (default)
    Run,
    /// Verify the access token and print the identity it belongs to
    Whoami,
    /// Validate the configuration and print it with the token redacted
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG may come from .env, so it is loaded before the subscriber.
    let env_file = dotenv::dotenv();

    if let Err(error) = telemetry::init_tracing() {
        eprintln!("failed to initialise tracing: {error:#}");
        return ExitCode::FAILURE;
    }

    match env_file {
        Ok(path) => debug!(path = %path.display(), "loaded environment file"),
        Err(error) if error.not_found() => {}
        Err(error) => warn!(%error, "failed to read environment file"),
    }

    let config = match load_config().context("failed to load configuration") {
        Ok(config) => config,
        Err(error) => {
            error!("{error:#}");
            return ExitCode::from(BotError::configuration(error.to_string()).exit_code());
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config).await,
        Commands::Whoami => whoami(&config).await,
        Commands::CheckConfig => check_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "echobot stopped");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(config: &BotConfig) -> Result<(), BotError> {
    info!("starting echobot");
    run_bot(config, shutdown_signal()).await?;
    info!("echobot shut down");
    Ok(())
}

async fn whoami(config: &BotConfig) -> Result<(), BotError> {
    let connected = SessionHandle::from_config(&config.matrix)?.connect().await?;
    println!("{}", connected.user_id());
    Ok(())
}

fn check_config(config: &BotConfig) -> Result<(), BotError> {
    SessionHandle::from_config(&config.matrix)?;
    println!("{config:#?}");
    Ok(())
}
