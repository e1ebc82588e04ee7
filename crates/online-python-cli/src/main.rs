//! online-python CLI
//!
//! Uploads local files to online-python.com, runs the first one remotely and
//! relays its terminal I/O.

mod cli;

use std::{fs::OpenOptions, path::Path, sync::Mutex};

use anyhow::Context;
use clap::Parser;
use online_python_core::RunRequest;
use online_python_session::{Console, FAILURE_EXIT_CODE, start};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match init_tracing(cli.log.as_deref()) {
        Ok(()) => {
            // The Err case only means a provider is already installed.
            let _ = rustls::crypto::ring::default_provider().install_default();
            match run(cli).await {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!("{e:#}");
                    eprintln!("online-python: {e:#}");
                    FAILURE_EXIT_CODE
                }
            }
        }
        Err(e) => {
            eprintln!("online-python: {e:#}");
            FAILURE_EXIT_CODE
        }
    };

    // A stdin read left pending by an interrupt would hold up runtime shutdown.
    std::process::exit(code);
}

/// With a log path everything goes to that file at debug level;
/// otherwise only errors reach stderr unless `RUST_LOG` says otherwise.
fn init_tracing(log: Option<&Path>) -> anyhow::Result<()> {
    match log {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .with(EnvFilter::new("warn,online_python=debug"))
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "error".into()))
                .init();
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let request = RunRequest::from_paths(&cli.files, cli.run_args())
        .await
        .context("cannot prepare input files")?;
    let config = cli.relay_config();

    let mut console = Console::stdio();
    let termination = start(&request, &config, &mut console, shutdown_signal())
        .await
        .context("remote session failed")?;
    tracing::info!(?termination, "Finished");
    Ok(termination.exit_code())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
