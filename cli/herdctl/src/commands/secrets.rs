//! Secrets command.

use anyhow::{Context, Result};
use clap::Args;

use super::CommandContext;

/// Print the cluster secrets bundle, generating and storing it if needed.
#[derive(Debug, Args)]
pub struct SecretsCommand {}

impl SecretsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let bundle = ctx
            .secrets()
            .get()
            .await
            .context("Failed to load secrets bundle")?;
        print!("{}", bundle.to_yaml()?);
        Ok(())
    }
}
