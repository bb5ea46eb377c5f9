//! Node management API seam.
//!
//! [`NodeApi`] enumerates every call the orchestrators make against a node;
//! [`Connector`] hands out a client for a [`NodeSpec`]. The gRPC transport in
//! [`crate::transport`] implements both for real nodes.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;

use crate::cluster::NodeSpec;
use crate::error::{ApiError, Error};
use crate::node::MachineStatus;

/// ApplyConfiguration call. The mode is always automatic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub data: Vec<u8>,
    pub dry_run: bool,
}

/// Result of an ApplyConfiguration call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApplyResponse {
    /// Mode the node chose for the change.
    pub mode: String,

    /// Free-text description of the change.
    pub mode_details: String,

    pub warnings: Vec<String>,
}

/// A partition to wipe on reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetPartition {
    pub label: String,
    pub wipe: bool,
}

/// Reset call. An empty partition list wipes the whole disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetRequest {
    pub graceful: bool,
    pub reboot: bool,
    pub partitions: Vec<ResetPartition>,
}

/// How the node restarts into the new image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebootMode {
    /// kexec into the new kernel.
    #[default]
    Default,
    /// Full power cycle.
    Powercycle,
}

impl fmt::Display for RebootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebootMode::Default => f.write_str("default"),
            RebootMode::Powercycle => f.write_str("powercycle"),
        }
    }
}

impl FromStr for RebootMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(RebootMode::Default),
            "powercycle" => Ok(RebootMode::Powercycle),
            other => Err(Error::Config(format!(
                "invalid reboot mode {other:?} (expected default or powercycle)"
            ))),
        }
    }
}

/// Upgrade call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    pub image: String,
    pub preserve: bool,
    pub force: bool,
    pub reboot_mode: RebootMode,
}

/// An installed system extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    pub version: String,
}

/// One item of the node's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    MachineStatus(MachineStatus),
    /// Anything that is not a machine status change.
    Other { type_url: String },
}

/// Stream of node events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<NodeEvent, ApiError>> + Send>>;

/// Management API of a single node.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Current stage and readiness.
    async fn machine_status(&self) -> Result<MachineStatus, ApiError>;

    /// Installed extensions.
    async fn extensions(&self) -> Result<Vec<Extension>, ApiError>;

    /// Running OS version, without a leading `v`.
    async fn os_version(&self) -> Result<String, ApiError>;

    async fn apply_configuration(&self, request: ApplyRequest) -> Result<ApplyResponse, ApiError>;

    /// Initialize etcd on this node.
    async fn bootstrap(&self) -> Result<(), ApiError>;

    async fn reset(&self, request: ResetRequest) -> Result<(), ApiError>;

    async fn upgrade(&self, request: UpgradeRequest) -> Result<(), ApiError>;

    /// Number of etcd members known to this node.
    async fn etcd_member_count(&self) -> Result<usize, ApiError>;

    /// State of the named service, `None` if the node does not run it.
    async fn service_state(&self, service: &str) -> Result<Option<String>, ApiError>;

    /// Subscribe to the node's event stream, starting from now.
    async fn watch_events(&self) -> Result<EventStream, ApiError>;
}

/// Produces clients for configured nodes.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, node: &NodeSpec) -> Result<Arc<dyn NodeApi>, Error>;
}
