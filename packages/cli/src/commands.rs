// ABOUTME: CLI command definitions and dispatch for the sandbox harness
// ABOUTME: Wires settings, the wsb.exe control surface, and the orchestrator together

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use harness_sandbox::{
    CancellationToken, ConfigError, HarnessSettings, RunReport, SandboxError,
    SandboxOrchestrator, StepOutcome, WsbCli,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "harness")]
#[command(about = "Launch Windows Sandbox, share the release build, and install it inside the guest")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging for the harness crates
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the run report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Ensure a sandbox is running, then deploy and install (default)
    Run,
    /// Show the id of the running sandbox, if any
    Status,
    /// Deploy and install into an already running sandbox
    Deploy,
}

pub async fn execute(cli: &Cli, cancel: CancellationToken) -> Result<()> {
    let command = cli.command.clone().unwrap_or(Commands::Run);
    let settings = load_settings(&command).context("Failed to load harness settings")?;
    info!(
        bin_dir = %settings.bin_dir.display(),
        log_dir = %settings.log_dir.display(),
        "Loaded harness settings"
    );

    let control = Arc::new(WsbCli::new(&settings.wsb_path, &settings.launcher_path));
    let orchestrator = SandboxOrchestrator::new(control, settings).with_cancellation(cancel);

    match command {
        Commands::Run => {
            let report = orchestrator.run().await.map_err(show_failed_steps)?;
            print_report(&report, cli.json)?;
        }
        Commands::Deploy => {
            let report = orchestrator
                .deploy_existing()
                .await
                .map_err(show_failed_steps)?;
            print_report(&report, cli.json)?;
        }
        Commands::Status => match orchestrator.query_running_instance().await? {
            Some(handle) if cli.json => {
                println!("{}", serde_json::json!({ "running": true, "id": handle }));
            }
            Some(handle) => println!("{} {}", "Sandbox is running, id:".green(), handle),
            None if cli.json => println!("{}", serde_json::json!({ "running": false })),
            None => println!("{}", "Sandbox is not running".yellow()),
        },
    }

    Ok(())
}

/// `status` never touches the shared host directories, so it does not need a workspace
fn load_settings(command: &Commands) -> Result<HarnessSettings, ConfigError> {
    let lookup = |name: &str| std::env::var(name).ok();
    match command {
        Commands::Status => HarnessSettings::from_lookup_at(lookup, &std::env::current_dir()?),
        Commands::Run | Commands::Deploy => HarnessSettings::from_lookup(lookup),
    }
}

fn show_failed_steps(err: SandboxError) -> SandboxError {
    if let SandboxError::DeployFailed(steps) = &err {
        eprint!("{}", render_steps(steps));
    }
    err
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let body = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
        println!("{}", body);
    } else {
        print!("{}", render_report(report));
    }
    Ok(())
}

/// Human-readable summary of a run
pub fn render_report(report: &RunReport) -> String {
    let origin = if report.freshly_launched {
        "freshly launched"
    } else {
        "already running"
    };
    let mut out = format!("Sandbox {} ({})\n", report.handle.as_str().bold(), origin);
    out.push_str(&render_steps(&report.steps));

    let elapsed = report.finished_at - report.started_at;
    out.push_str(&format!("Finished in {} ms\n", elapsed.num_milliseconds()));
    out
}

/// One line per deploy step with its exit code, plus stderr for failures
pub fn render_steps(steps: &[StepOutcome]) -> String {
    let mut out = String::new();
    for step in steps {
        let marker = if step.succeeded {
            "ok".green()
        } else {
            "failed".red()
        };
        let exit = step
            .exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string());
        out.push_str(&format!("  {} {} (exit {})", marker, step.label, exit));
        if !step.succeeded && !step.stderr.trim().is_empty() {
            out.push_str(&format!(": {}", step.stderr.trim()));
        }
        out.push('\n');
    }
    out
}
