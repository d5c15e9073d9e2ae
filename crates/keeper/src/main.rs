mod cli;
mod config;
mod format;
mod wiring;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use keeper_common::ErrorCode;
use keeper_ensemble::{EnsembleError, EnsembleNode, NodeStatus};
use tokio::sync::broadcast::error::RecvError;

use cli::{Cli, Command};
use config::KeeperConfig;

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_new(cli.log_directive())
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Hold the non-blocking guards for the lifetime of main so logs flush on exit.
    let _log_guards = init_logging(env_filter, cli.log_file.as_deref())?;

    let config = KeeperConfig::load(&cli.config_path(), cli.config.is_some())?;

    let mut node = match wiring::open_node(&config) {
        Ok(node) => node,
        Err(e) => return Ok(open_failed(&e, cli.json)),
    };

    match cli.command.clone().unwrap_or(Command::Reconcile) {
        Command::Reconcile => {
            let status = node.reconcile();
            report(&status, cli.json);
            Ok(exit_for(&status))
        }
        Command::Depart { id } => {
            let status = node.on_peer_departed(Some(id));
            report(&status, cli.json);
            Ok(exit_for(&status))
        }
        Command::Status => status(&mut node, cli.json),
        Command::Run { interval } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(watch(&mut node, interval, cli.json))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────

fn status(node: &mut EnsembleNode, json: bool) -> anyhow::Result<ExitCode> {
    let status = node.observe()?;
    let snapshot = node.snapshot();
    if json {
        format::print_json(&serde_json::json!({
            "status": status,
            "snapshot": snapshot,
        }));
    } else {
        println!("keeper: {}", format::status_line(&status));
        print!("{}", format::snapshot_detail(&snapshot));
    }
    Ok(exit_for(&status))
}

/// Reconcile on a fixed period until Ctrl+C.
async fn watch(node: &mut EnsembleNode, interval: u64, json: bool) -> anyhow::Result<()> {
    let mut events = node.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    let mut last: Option<NodeStatus> = None;

    tracing::info!(
        "keeper v{} watching every {}s",
        env!("CARGO_PKG_VERSION"),
        interval.max(1)
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            _ = ticker.tick() => {
                // Reconcile shells out and writes files.
                let status = tokio::task::block_in_place(|| node.reconcile());
                if last.as_ref() != Some(&status) {
                    report(&status, json);
                    last = Some(status);
                }
            }
            event = events.recv() => match event {
                Ok(event) => tracing::debug!(?event, "Ensemble event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    tracing::info!("Shutting down...");
    Ok(())
}

// ── Output ──────────────────────────────────────────────────────────

fn report(status: &NodeStatus, json: bool) {
    if json {
        format::print_json(status);
    } else {
        println!("keeper: {}", format::status_line(status));
    }
}

fn exit_for(status: &NodeStatus) -> ExitCode {
    match status {
        NodeStatus::Blocked { .. } => ExitCode::FAILURE,
        NodeStatus::Active { .. } | NodeStatus::Waiting { .. } => ExitCode::SUCCESS,
    }
}

fn open_failed(e: &EnsembleError, json: bool) -> ExitCode {
    let code = ErrorCode::from(e);
    tracing::error!(error = %e, code = ?code, "Failed to open node");
    if json {
        format::print_json(&serde_json::json!({
            "error": code,
            "message": e.to_string(),
        }));
    } else {
        eprintln!("Error: {e}");
    }
    ExitCode::from(u8::try_from(code.exit_code()).unwrap_or(1))
}

// ── Logging setup ───────────────────────────────────────────────────

/// Initialize tracing with stderr + optional file output.
/// Returns guards that must be held for the lifetime of the program
/// to ensure the non-blocking writers flush on shutdown.
fn init_logging(
    env_filter: tracing_subscriber::EnvFilter,
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<Vec<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    // stdout carries command output; logs go to stderr.
    let (nb_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(nb_stderr);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (nb_file, file_guard) = tracing_appender::non_blocking(file);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(nb_file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();

        Ok(vec![stderr_guard, file_guard])
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();

        Ok(vec![stderr_guard])
    }
}
