use std::{io, process::ExitCode};

use clap::{error::ErrorKind, Parser};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use dining::{
    cli::Cli,
    error::SimulationError,
    simulation::Simulation,
};

// 引数の誤り
const EXIT_USAGE: u8 = 1;
// デッドロックを検出して打ち切った
const EXIT_DEADLOCK: u8 = 2;
// Ctrl-C で止めた
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // 標準出力はスナップショット専用なので、ログは標準エラーへ
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_USAGE),
            };
        }
    };

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Usage: dining <number_of_actors> <repetitions>");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let simulation = match Simulation::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    let cancel = simulation.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling philosophers");
            cancel.cancel();
        }
    });

    match simulation.run(io::stdout()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(SimulationError::Deadlock { stuck }) => {
            eprintln!("deadlock: {} philosopher(s) made no progress", stuck.len());
            for s in &stuck {
                eprintln!("  {s}");
            }
            ExitCode::from(EXIT_DEADLOCK)
        }
        Err(SimulationError::Cancelled) => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) => {
            error!(error = %e, "simulation failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
