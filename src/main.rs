//! CLI entry point for rust-lockin.
//!
//! # Usage
//!
//! Control over stdin/stdout:
//! ```bash
//! rust-lockin run --config config/lockin.toml
//! ```
//!
//! Control over TCP (one dispatcher per connection):
//! ```bash
//! rust-lockin serve --bind 0.0.0.0:5025
//! ```
//!
//! Print the effective settings:
//! ```bash
//! rust-lockin config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_lockin::config::Settings;
use rust_lockin::lockin::LockIn;
use rust_lockin::logging;
use rust_lockin::server::ControlServer;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rust-lockin")]
#[command(about = "Lock-in amplifier measurement core with a text control protocol", long_about = None)]
struct Cli {
    /// Settings file (TOML); defaults to config/lockin.toml when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Accept commands on stdin, reply on stdout
    Run,

    /// Accept commands over TCP
    Serve {
        /// Listen address, overrides `server.bind`
        #[arg(long)]
        bind: Option<String>,
    },

    /// Print the effective settings as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::load().context("Failed to load settings")?,
    };

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&settings)?);
        return Ok(());
    }

    logging::init_from_settings(&settings).map_err(anyhow::Error::msg)?;
    eprintln!("{} - lock-in measurement core", settings.application.name);

    let lockin = Arc::new(LockIn::with_mock(settings.clone())?);
    lockin.start().context("Acquisition did not start")?;

    let outcome = match cli.command {
        Commands::Run => run_console(&lockin).await,
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| settings.server.bind.clone());
            serve(&lockin, &addr).await
        }
        Commands::Config => Ok(()),
    };

    lockin.shutdown()?;
    info!("Shut down");
    outcome
}

/// Dispatcher over stdin/stdout on its own thread until an exit keyword, EOF or Ctrl-C.
async fn run_console(lockin: &Arc<LockIn>) -> Result<()> {
    let mut dispatcher = lockin.dispatcher();
    let (done_tx, done_rx) = oneshot::channel();

    std::thread::Builder::new()
        .name("lockin-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            let result = dispatcher.run(stdin.lock(), stdout.lock());
            let _ = done_tx.send(result);
        })?;

    tokio::select! {
        result = done_rx => {
            match result {
                Ok(Ok(())) => info!("Control channel closed"),
                Ok(Err(e)) => error!(error = %e, "Control channel failed"),
                Err(_) => error!("Console thread ended unexpectedly"),
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
    Ok(())
}

async fn serve(lockin: &Arc<LockIn>, addr: &str) -> Result<()> {
    let server = ControlServer::bind(addr, lockin.dispatcher_factory())
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    eprintln!("Listening on {} - Ctrl+C to stop", server.local_addr()?);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
    Ok(())
}
