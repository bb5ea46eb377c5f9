//! herd - converge a cluster of immutable-OS nodes to its declared configuration.
//!
//! Reads the cluster file, selects nodes, and drives the apply, bootstrap,
//! upgrade and reset workflows of `herd-converge` against them.

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::warn;

mod commands;
mod config;
mod error;
mod logging;
mod output;
mod providers;
mod render;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ctrl-C cancels the run at the next attempt boundary.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            let _ = shutdown_tx.send(true);
        }
    });

    if let Err(e) = cli.run(shutdown_rx).await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
