use clap::Parser;
use colored::*;
use harness_cli::{execute, init_tracing, Cli};
use harness_sandbox::CancellationToken;
use std::process;
use tracing::warn;

/// Exit status used when a second Ctrl-C forces an immediate stop
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run (press Ctrl-C again to exit immediately)");
            on_interrupt.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    if let Err(e) = execute(&cli, cancel).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
