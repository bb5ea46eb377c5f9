//! Runtime view of a node, as discovered by the gatherer.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::cluster::NodeSpec;
use crate::error::Error;

/// Lifecycle stage reported by the node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MachineStage {
    #[default]
    Unknown,
    Booting,
    Installing,
    Maintenance,
    Running,
    Rebooting,
    ShuttingDown,
    Resetting,
    Upgrading,
}

impl MachineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStage::Unknown => "unknown",
            MachineStage::Booting => "booting",
            MachineStage::Installing => "installing",
            MachineStage::Maintenance => "maintenance",
            MachineStage::Running => "running",
            MachineStage::Rebooting => "rebooting",
            MachineStage::ShuttingDown => "shuttingDown",
            MachineStage::Resetting => "resetting",
            MachineStage::Upgrading => "upgrading",
        }
    }
}

impl fmt::Display for MachineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineStage {
    type Err = std::convert::Infallible;

    /// Case and separator insensitive; unrecognized names map to `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Ok(match normalized.as_str() {
            "booting" => MachineStage::Booting,
            "installing" => MachineStage::Installing,
            "maintenance" => MachineStage::Maintenance,
            "running" => MachineStage::Running,
            "rebooting" => MachineStage::Rebooting,
            "shuttingdown" | "shutdown" => MachineStage::ShuttingDown,
            "resetting" => MachineStage::Resetting,
            "upgrading" => MachineStage::Upgrading,
            _ => MachineStage::Unknown,
        })
    }
}

/// A readiness condition the node has not met yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmetCondition {
    pub name: String,
    pub reason: String,
}

impl UnmetCondition {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Readiness flag plus the ordered list of unmet conditions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmet_conditions: Vec<UnmetCondition>,
}

impl Readiness {
    pub fn ready() -> Self {
        Self {
            ready: true,
            unmet_conditions: Vec::new(),
        }
    }

    pub fn not_ready(unmet_conditions: Vec<UnmetCondition>) -> Self {
        Self {
            ready: false,
            unmet_conditions,
        }
    }

    /// `[name: reason, ...]`
    pub fn unmet_summary(&self) -> String {
        let conditions: Vec<String> = self
            .unmet_conditions
            .iter()
            .map(|c| format!("{}: {}", c.name, c.reason))
            .collect();
        format!("[{}]", conditions.join(", "))
    }
}

/// Stage and readiness as reported by one machine status read or event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MachineStatus {
    pub stage: MachineStage,
    pub readiness: Readiness,
}

impl MachineStatus {
    pub fn new(stage: MachineStage, readiness: Readiness) -> Self {
        Self { stage, readiness }
    }

    /// Running and ready; otherwise the reason it is not.
    pub fn check_healthy(&self) -> Result<(), String> {
        if self.stage != MachineStage::Running {
            return Err(format!("machine not in stage running: {}", self.stage));
        }
        if !self.readiness.ready {
            return Err(format!("machine not ready ({})", self.readiness.unmet_summary()));
        }
        Ok(())
    }
}

/// A configured node plus everything discovered about it in this run.
///
/// Built and mutated only by its own gather task; read-only afterwards.
#[derive(Debug)]
pub struct Node {
    pub spec: NodeSpec,
    pub stage: MachineStage,
    pub readiness: Readiness,

    /// OS image variant identity.
    pub schematic: String,

    pub os_version: String,

    /// Desired configuration produced by the renderer.
    pub rendered_config: Option<Vec<u8>>,

    /// Set when any gather step failed for this node.
    pub gather_error: Option<Error>,
}

impl Node {
    /// Create a node with nothing discovered yet.
    pub fn new(spec: NodeSpec) -> Self {
        Self {
            spec,
            stage: MachineStage::Unknown,
            readiness: Readiness::default(),
            schematic: String::new(),
            os_version: String::new(),
            rendered_config: None,
            gather_error: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.spec.host
    }

    pub fn status(&self) -> MachineStatus {
        MachineStatus::new(self.stage, self.readiness.clone())
    }
}
