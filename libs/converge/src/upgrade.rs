//! OS upgrades.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, info_span, Instrument};

use crate::api::{RebootMode, UpgradeRequest};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::gather::gather;
use crate::node::Node;
use crate::preflight::{self, Policy};
use crate::render::installer_image;
use crate::stabilize::{self, STABLE_WINDOW};

static INSTALLER_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*/([a-zA-Z0-9]+):v?(.+)$").expect("valid installer regex"));

/// Identity of an installer image: schematic and OS version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerImage {
    pub schematic: String,
    pub version: String,
}

impl FromStr for InstallerImage {
    type Err = Error;

    fn from_str(image: &str) -> Result<Self> {
        let captures = INSTALLER_IMAGE
            .captures(image)
            .ok_or_else(|| Error::InstallerImage {
                image: image.to_string(),
            })?;
        Ok(Self {
            schematic: captures[1].to_string(),
            version: captures[2].to_string(),
        })
    }
}

/// Upgrade run options.
#[derive(Debug, Clone)]
pub struct UpgradeOptions {
    /// Report the plan without upgrading.
    pub dry_run: bool,
    pub confirm: bool,
    pub force: bool,
    pub preserve: bool,
    pub reboot_mode: RebootMode,
    pub skip_problematic_nodes: bool,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            confirm: true,
            force: false,
            preserve: true,
            reboot_mode: RebootMode::Default,
            skip_problematic_nodes: false,
        }
    }
}

/// What happened to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpgradeOutcome {
    UpToDate,
    /// An upgrade is needed but the run is a dry run.
    Pending,
    Skipped,
    Upgraded,
}

/// Gather, check and upgrade every node in the context.
pub async fn run(ctx: &RunContext, options: &UpgradeOptions) -> Result<Vec<(String, UpgradeOutcome)>> {
    let nodes = gather(ctx).await;
    let policy = Policy::upgrade().skip_problematic(options.skip_problematic_nodes);
    let eligible = preflight::check(nodes, &policy)?;

    let mut outcomes = Vec::with_capacity(eligible.nodes.len());
    for node in &eligible.nodes {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let outcome = upgrade_node(ctx, node, options)
            .instrument(info_span!("upgrade", node = %node.host()))
            .await?;
        outcomes.push((node.host().to_string(), outcome));
    }

    Ok(outcomes)
}

/// Upgrade one node if its image differs from the desired one.
pub async fn upgrade_node(ctx: &RunContext, node: &Node, options: &UpgradeOptions) -> Result<UpgradeOutcome> {
    let host = node.host();
    let config = node
        .rendered_config
        .as_ref()
        .ok_or_else(|| Error::Render(format!("no configuration rendered for {host}")))?;
    let image = installer_image(config)?;
    let desired: InstallerImage = image.parse()?;

    if desired.schematic == node.schematic && desired.version == node.os_version {
        info!(schematic = %node.schematic, version = %node.os_version, "Node is up to date");
        return Ok(UpgradeOutcome::UpToDate);
    }

    info!(
        current_schematic = %node.schematic,
        desired_schematic = %desired.schematic,
        current_version = %node.os_version,
        desired_version = %desired.version,
        "Upgrade required"
    );

    if options.dry_run {
        return Ok(UpgradeOutcome::Pending);
    }

    if options.confirm {
        let question = format!(
            "Do you want to upgrade node {host} with installer {image}? This will reboot the node."
        );
        if !ctx.prompter.confirm(&question).await? {
            info!("Skipped by operator");
            return Ok(UpgradeOutcome::Skipped);
        }
    }

    let client = ctx.connector.connect(&node.spec).await?;
    client
        .upgrade(UpgradeRequest {
            image: image.clone(),
            preserve: options.preserve,
            force: options.force,
            reboot_mode: options.reboot_mode,
        })
        .await
        .map_err(|error| Error::Upgrade {
            host: host.to_string(),
            error,
        })?;
    info!(image = %image, reboot_mode = %options.reboot_mode, "Upgrade issued");

    stabilize::wait_stable(ctx, &node.spec, STABLE_WINDOW).await?;
    Ok(UpgradeOutcome::Upgraded)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("registry/example.com/imagename:v1.9.2", "imagename", "1.9.2")]
    #[case("factory.example.com/installer/376567988ad3:v1.10.0-beta.1", "376567988ad3", "1.10.0-beta.1")]
    #[case("ghcr.io/siderolabs/installer:1.8.0", "installer", "1.8.0")]
    fn test_parse_installer_image(
        #[case] image: &str,
        #[case] schematic: &str,
        #[case] version: &str,
    ) {
        let parsed: InstallerImage = image.parse().unwrap();
        assert_eq!(parsed.schematic, schematic);
        assert_eq!(parsed.version, version);
    }

    #[rstest]
    #[case("installer:v1.9.2")]
    #[case("registry/example.com/image-name:v1.9.2")]
    #[case("registry/example.com/imagename")]
    fn test_reject_bad_installer_image(#[case] image: &str) {
        assert!(matches!(
            image.parse::<InstallerImage>(),
            Err(Error::InstallerImage { .. })
        ));
    }
}
