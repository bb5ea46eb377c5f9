//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("unknown log level {0:?} (expected debug, info, warn or error)")]
    InvalidLogLevel(String),

    #[error("no nodes selected")]
    NoNodesSelected,

    #[error("failed to {action} {binary}: {error}")]
    Process {
        action: &'static str,
        binary: String,
        error: std::io::Error,
    },

    #[error("{command} exited with {status}")]
    ProcessFailed {
        command: String,
        status: std::process::ExitStatus,
    },
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(CliError::NoNodesSelected) = err.downcast_ref::<CliError>() {
        eprintln!(
            "\n{}",
            "Hint: Check the nodes in the cluster file and the --nodes selector.".yellow()
        );
        return;
    }

    if let Some(core_err) = err.downcast_ref::<herd_converge::Error>() {
        match core_err {
            herd_converge::Error::PreflightFailed { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Use --skip-problematic-nodes to continue with the healthy nodes.".yellow()
                );
            }
            herd_converge::Error::Connect { .. } => {
                eprintln!(
                    "\n{}",
                    "Hint: Check that the node is reachable on the management port.".yellow()
                );
            }
            _ => {}
        }
    }
}
