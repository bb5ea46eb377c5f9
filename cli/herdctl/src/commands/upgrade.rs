//! Upgrade command.

use anyhow::Result;
use clap::{ArgAction, Args};
use herd_converge::api::RebootMode;
use herd_converge::upgrade::{self, UpgradeOptions, UpgradeOutcome};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_success, OutputFormat};

use super::CommandContext;

/// Upgrade nodes whose OS image differs from the configured installer.
#[derive(Debug, Args)]
pub struct UpgradeCommand {
    /// Ask for confirmation before upgrading each node.
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    confirm: bool,

    /// Report the pending upgrades without performing them.
    #[arg(long)]
    dry_run: bool,

    /// Upgrade even when the node reports it is not safe to.
    #[arg(long)]
    force: bool,

    /// Keep the node's ephemeral data across the upgrade.
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    preserve: bool,

    /// Reboot mode (default, powercycle).
    #[arg(long, default_value = "default")]
    reboot_mode: String,

    /// Continue with the healthy nodes when some fail the pre-flight checks.
    #[arg(long)]
    skip_problematic_nodes: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct UpgradeRow {
    #[tabled(rename = "Node")]
    node: String,

    #[tabled(rename = "Result")]
    result: &'static str,
}

fn label(outcome: UpgradeOutcome) -> &'static str {
    match outcome {
        UpgradeOutcome::UpToDate => "up to date",
        UpgradeOutcome::Pending => "upgrade pending",
        UpgradeOutcome::Skipped => "skipped",
        UpgradeOutcome::Upgraded => "upgraded",
    }
}

impl UpgradeCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let reboot_mode: RebootMode = self.reboot_mode.parse()?;
        let options = UpgradeOptions {
            dry_run: self.dry_run,
            confirm: self.confirm,
            force: self.force,
            preserve: self.preserve,
            reboot_mode,
            skip_problematic_nodes: self.skip_problematic_nodes,
        };

        let outcomes = upgrade::run(&ctx.run_context()?, &options).await?;

        let rows: Vec<_> = outcomes
            .iter()
            .map(|(host, outcome)| UpgradeRow {
                node: host.clone(),
                result: label(*outcome),
            })
            .collect();
        print_output(&rows, OutputFormat::Table);

        let upgraded = outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == UpgradeOutcome::Upgraded)
            .count();
        if !self.dry_run {
            print_success(&format!("Upgraded {upgraded} node(s)"));
        }
        Ok(())
    }
}
