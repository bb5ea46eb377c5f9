//! Per-operation eligibility filtering.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::node::{MachineStage, Node};

/// Operation a preflight check is run for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Apply,
    Bootstrap,
    Upgrade,
    Reset,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Apply => "apply",
            Operation::Bootstrap => "bootstrap",
            Operation::Upgrade => "upgrade",
            Operation::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Stages from which a configuration can be applied.
pub const APPLY_STAGES: &[MachineStage] = &[
    MachineStage::Maintenance,
    MachineStage::Booting,
    MachineStage::Running,
];

/// Stages from which an upgrade can start.
pub const UPGRADE_STAGES: &[MachineStage] = &[MachineStage::Running];

/// Stages accepted when bootstrapping a fresh cluster.
pub const BOOTSTRAP_STAGES: &[MachineStage] = &[MachineStage::Maintenance];

/// Eligibility rule for one operation.
#[derive(Debug, Clone)]
pub struct Policy {
    pub operation: Operation,
    pub allowed_stages: &'static [MachineStage],

    /// Drop nodes that are not ready.
    pub require_ready: bool,

    /// Continue with the healthy subset instead of aborting.
    pub skip_problematic: bool,
}

impl Policy {
    /// Create a policy requiring readiness and aborting on any ineligible node.
    pub fn new(operation: Operation, allowed_stages: &'static [MachineStage]) -> Self {
        Self {
            operation,
            allowed_stages,
            require_ready: true,
            skip_problematic: false,
        }
    }

    pub fn apply() -> Self {
        Self::new(Operation::Apply, APPLY_STAGES)
    }

    pub fn upgrade() -> Self {
        Self::new(Operation::Upgrade, UPGRADE_STAGES)
    }

    pub fn bootstrap() -> Self {
        Self::new(Operation::Bootstrap, BOOTSTRAP_STAGES)
    }

    pub fn require_ready(mut self, require_ready: bool) -> Self {
        self.require_ready = require_ready;
        self
    }

    pub fn skip_problematic(mut self, skip_problematic: bool) -> Self {
        self.skip_problematic = skip_problematic;
        self
    }

    /// Why `node` is not eligible, if it is not.
    pub fn ineligibility(&self, node: &Node) -> Option<String> {
        if let Some(err) = &node.gather_error {
            return Some(err.to_string());
        }
        if self.require_ready && !node.readiness.ready {
            return Some(format!(
                "node not ready {}",
                node.readiness.unmet_summary()
            ));
        }
        if !self.allowed_stages.contains(&node.stage) {
            return Some(format!(
                "stage {} not allowed for {}",
                node.stage, self.operation
            ));
        }
        None
    }
}

/// Nodes that passed the preflight check.
#[derive(Debug)]
pub struct Eligible {
    pub nodes: Vec<Node>,

    /// Every eligible node is in maintenance.
    pub all_maintenance: bool,
}

/// Filter `nodes` by `policy`, preserving order.
pub fn check(nodes: Vec<Node>, policy: &Policy) -> Result<Eligible> {
    let total = nodes.len();
    let mut eligible = Vec::with_capacity(total);

    for node in nodes {
        match policy.ineligibility(&node) {
            Some(reason) => warn!(
                node = %node.host(),
                operation = %policy.operation,
                reason = %reason,
                "Node failed pre-flight checks"
            ),
            None => eligible.push(node),
        }
    }

    if eligible.is_empty() {
        return Err(Error::NoHealthyNodes);
    }

    if eligible.len() < total {
        if !policy.skip_problematic {
            return Err(Error::PreflightFailed {
                operation: policy.operation,
            });
        }
        warn!(
            eligible = eligible.len(),
            total, "pre-flight checks failed for some nodes. continuing with healthy nodes only"
        );
    }

    let all_maintenance = eligible.iter().all(|n| n.stage == MachineStage::Maintenance);
    info!(
        operation = %policy.operation,
        eligible = eligible.len(),
        "Pre-flight checks passed"
    );

    Ok(Eligible {
        nodes: eligible,
        all_maintenance,
    })
}
