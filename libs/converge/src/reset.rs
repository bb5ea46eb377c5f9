//! Best-effort node reset.
//!
//! Unlike the other operations, a failing node does not stop the run: every
//! node is attempted and the results are tallied.

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::api::{ResetPartition, ResetRequest};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::gather::gather;
use crate::node::{MachineStage, Node};

/// Partitions wiped by a targeted (non-full) reset.
pub const RESET_PARTITIONS: &[&str] = &["STATE", "EPHEMERAL"];

/// Reset run options.
#[derive(Debug, Clone)]
pub struct ResetOptions {
    /// Wipe the whole disk instead of the state and ephemeral partitions.
    pub full: bool,
    pub graceful: bool,
    /// Power off instead of rebooting.
    pub shutdown: bool,
    pub confirm: bool,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            full: true,
            graceful: false,
            shutdown: false,
            confirm: true,
        }
    }
}

impl ResetOptions {
    /// The Reset call these options describe.
    pub fn request(&self) -> ResetRequest {
        let partitions = if self.full {
            Vec::new()
        } else {
            RESET_PARTITIONS
                .iter()
                .map(|label| ResetPartition {
                    label: label.to_string(),
                    wipe: true,
                })
                .collect()
        };

        ResetRequest {
            graceful: self.graceful,
            reboot: !self.shutdown,
            partitions,
        }
    }
}

/// Aggregate reset results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ResetTally {
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ResetTally {
    pub fn total(&self) -> usize {
        self.success + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeResult {
    Success,
    Skipped,
    Failed,
}

/// Gather and reset every node in the context.
///
/// Only cancellation is returned as an error; per-node failures are tallied.
pub async fn run(ctx: &RunContext, options: &ResetOptions) -> Result<ResetTally> {
    let nodes = gather(ctx).await;
    let mut tally = ResetTally::default();

    for node in &nodes {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let result = reset_node(ctx, node, options)
            .instrument(info_span!("reset", node = %node.host()))
            .await?;
        match result {
            NodeResult::Success => tally.success += 1,
            NodeResult::Skipped => tally.skipped += 1,
            NodeResult::Failed => tally.failed += 1,
        }
    }

    info!(
        success = tally.success,
        skipped = tally.skipped,
        failed = tally.failed,
        "Reset finished"
    );
    Ok(tally)
}

async fn reset_node(ctx: &RunContext, node: &Node, options: &ResetOptions) -> Result<NodeResult> {
    if node.stage == MachineStage::Maintenance {
        info!("Node is already in maintenance, skipping");
        return Ok(NodeResult::Skipped);
    }

    if options.confirm {
        let question = format!(
            "Do you want to reset node {}? This will wipe its configuration.",
            node.host()
        );
        if !ctx.prompter.confirm(&question).await? {
            info!("Skipped by operator");
            return Ok(NodeResult::Skipped);
        }
    }

    let client = match ctx.connector.connect(&node.spec).await {
        Ok(client) => client,
        Err(err) => {
            warn!(error = %err, "Cannot reach node, skipping");
            return Ok(NodeResult::Skipped);
        }
    };

    match client.reset(options.request()).await {
        Ok(()) => {
            info!(full = options.full, reboot = !options.shutdown, "Reset issued");
            Ok(NodeResult::Success)
        }
        Err(err) => {
            warn!(error = %err, "Reset failed");
            Ok(NodeResult::Failed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_reset_wipes_everything() {
        let request = ResetOptions::default().request();
        assert!(request.partitions.is_empty());
        assert!(request.reboot);
        assert!(!request.graceful);
    }

    #[test]
    fn test_targeted_reset_wipes_state_and_ephemeral() {
        let options = ResetOptions {
            full: false,
            shutdown: true,
            graceful: true,
            ..ResetOptions::default()
        };
        let request = options.request();

        let labels: Vec<_> = request.partitions.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["STATE", "EPHEMERAL"]);
        assert!(request.partitions.iter().all(|p| p.wipe));
        assert!(!request.reboot);
        assert!(request.graceful);
    }
}
