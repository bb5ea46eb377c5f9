//! Reset command.

use anyhow::Result;
use clap::{ArgAction, Args};
use herd_converge::reset::{self, ResetOptions};

use crate::output::{print_success, print_warning};

use super::CommandContext;

/// Reset nodes, wiping their configuration.
#[derive(Debug, Args)]
pub struct ResetCommand {
    /// Ask for confirmation before resetting each node.
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    confirm: bool,

    /// Wipe the whole disk instead of only the state and ephemeral partitions.
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    full: bool,

    /// Leave etcd and drain the node before resetting.
    #[arg(long)]
    graceful: bool,

    /// Power the node off instead of rebooting it.
    #[arg(long)]
    shutdown: bool,
}

impl ResetCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let options = ResetOptions {
            full: self.full,
            graceful: self.graceful,
            shutdown: self.shutdown,
            confirm: self.confirm,
        };

        let tally = reset::run(&ctx.run_context()?, &options).await?;

        let summary = format!(
            "Reset {} of {} node(s): {} skipped, {} failed",
            tally.success,
            tally.total(),
            tally.skipped,
            tally.failed
        );
        if tally.failed > 0 {
            print_warning(&summary);
        } else {
            print_success(&summary);
        }
        Ok(())
    }
}
