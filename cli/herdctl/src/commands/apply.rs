//! Apply command.

use anyhow::Result;
use clap::{ArgAction, Args};
use herd_converge::apply::{self, ApplyOptions, ApplyOutcome};
use herd_converge::bootstrap::BootstrapOutcome;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_info, print_output, print_success, OutputFormat};

use super::CommandContext;

/// Apply the rendered configuration to every selected node.
#[derive(Debug, Args)]
pub struct ApplyCommand {
    /// Ask for confirmation before applying changes to each node.
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    confirm: bool,

    /// Show the changes without applying them.
    #[arg(long)]
    dry_run: bool,

    /// Bootstrap etcd afterwards if the cluster has not been bootstrapped yet.
    #[arg(long)]
    auto_bootstrap: bool,

    /// Continue with the healthy nodes when some fail the pre-flight checks.
    #[arg(long)]
    skip_problematic_nodes: bool,

    /// Do not wait for changed nodes to stabilize.
    #[arg(long)]
    skip_post_apply_checks: bool,

    /// Accept nodes that are not ready.
    #[arg(long)]
    allow_not_ready: bool,
}

#[derive(Debug, Serialize, Tabled)]
pub(super) struct OutcomeRow {
    #[tabled(rename = "Node")]
    pub node: String,

    #[tabled(rename = "Result")]
    pub result: &'static str,
}

pub(super) fn outcome_rows(outcomes: &[(String, ApplyOutcome)]) -> Vec<OutcomeRow> {
    outcomes
        .iter()
        .map(|(host, outcome)| OutcomeRow {
            node: host.clone(),
            result: match (outcome.changed, outcome.skipped) {
                (true, _) => "applied",
                (_, true) => "skipped",
                _ => "unchanged",
            },
        })
        .collect()
}

pub(super) fn print_bootstrap(outcome: BootstrapOutcome) {
    match outcome {
        BootstrapOutcome::Initiated => print_success("etcd bootstrap initiated"),
        BootstrapOutcome::AlreadyBootstrapped => print_info("etcd is already bootstrapped"),
        BootstrapOutcome::NoControlPlane => print_info("No control-plane node selected, bootstrap skipped"),
    }
}

impl ApplyCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let options = ApplyOptions {
            dry_run: self.dry_run,
            confirm: self.confirm,
            skip_post_apply_checks: self.skip_post_apply_checks,
            skip_problematic_nodes: self.skip_problematic_nodes,
            allow_not_ready: self.allow_not_ready,
            auto_bootstrap: self.auto_bootstrap,
        };

        let report = apply::run(&ctx.run_context()?, &options).await?;

        if self.dry_run {
            print_info(&format!(
                "Dry run finished for {} node(s), nothing was applied",
                report.outcomes.len()
            ));
            return Ok(());
        }

        print_output(&outcome_rows(&report.outcomes), OutputFormat::Table);
        print_success(&format!(
            "Applied {} node(s), skipped {}",
            report.changed(),
            report.skipped()
        ));
        if let Some(outcome) = report.bootstrap {
            print_bootstrap(outcome);
        }
        Ok(())
    }
}
