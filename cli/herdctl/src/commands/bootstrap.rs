//! Bootstrap command (fresh cluster).

use anyhow::Result;
use clap::{ArgAction, Args};
use herd_converge::bootstrap::{self, BootstrapOptions};

use crate::output::{print_output, OutputFormat};

use super::apply::{outcome_rows, print_bootstrap};
use super::CommandContext;

/// Configure maintenance nodes, bootstrap etcd and wait for the cluster to settle.
#[derive(Debug, Args)]
pub struct BootstrapCommand {
    /// Ask for confirmation before applying the configuration to each node.
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    confirm: bool,
}

impl BootstrapCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let options = BootstrapOptions {
            confirm: self.confirm,
        };
        let report = bootstrap::bootstrap_cluster(&ctx.run_context()?, &options).await?;

        print_output(&outcome_rows(&report.outcomes), OutputFormat::Table);
        print_bootstrap(report.bootstrap);
        Ok(())
    }
}
