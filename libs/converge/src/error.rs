//! Error types for the convergence engine.
//!
//! [`ApiError`] is the failure of one RPC against one node. [`Error`] is the
//! run-level taxonomy:
//!
//! - configuration errors (bad image reference, no control-plane seed, bad
//!   flag value) are never retried
//! - operational errors (commit failure, watchdog budget exhausted, no
//!   healthy nodes) abort the run
//! - per-node errors (gather failures) are stored on the node and only
//!   escalated by the preflight policy

use herd_reconcile::RetryError;
use thiserror::Error;

use crate::preflight::Operation;

/// Result alias for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of a single call against a node's management API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rpc error: {}", .0.message())]
    Status(tonic::Status),

    #[error("transport error: {0}")]
    Transport(tonic::transport::Error),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("node unavailable: {0}")]
    Unavailable(String),
}

impl ApiError {
    /// Create a decode error for the named payload.
    pub fn decode(what: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            what,
            reason: reason.to_string(),
        }
    }
}

impl From<tonic::Status> for ApiError {
    fn from(status: tonic::Status) -> Self {
        Self::Status(status)
    }
}

impl From<tonic::transport::Error> for ApiError {
    fn from(err: tonic::transport::Error) -> Self {
        Self::Transport(err)
    }
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("failed to build client for {host}: {reason}")]
    Client { host: String, reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{step}: {cause}")]
    Gather {
        step: &'static str,
        cause: Box<Error>,
    },

    #[error("secrets: {0}")]
    Secrets(String),

    #[error("render: {0}")]
    Render(String),

    #[error("prompt: {0}")]
    Prompt(String),

    #[error("no healthy nodes available to process")]
    NoHealthyNodes,

    #[error("aborting {operation} due to errors with some nodes")]
    PreflightFailed { operation: Operation },

    #[error("failed to apply configuration to {host}: {error}")]
    Apply { host: String, error: ApiError },

    #[error("node {host} did not stabilize: {reason}")]
    Stabilize { host: String, reason: String },

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("failed to upgrade {host}: {error}")]
    Upgrade { host: String, error: ApiError },

    #[error("invalid installer image {image:?}: expected <registry>/<schematic>:<version>")]
    InstallerImage { image: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Attach the gather step that failed.
    pub fn during(step: &'static str) -> impl FnOnce(Error) -> Error {
        move |cause| Error::Gather {
            step,
            cause: Box::new(cause),
        }
    }

    /// Convert a retry driver failure, mapping an exhausted budget with `exhausted`.
    pub fn from_retry(err: RetryError<Error>, exhausted: impl FnOnce(String) -> Error) -> Self {
        match err {
            RetryError::Fatal(err) => err,
            RetryError::Cancelled => Error::Cancelled,
            err @ RetryError::Exhausted { .. } => exhausted(err.to_string()),
        }
    }

    /// Returns true for errors caused by the run being cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
