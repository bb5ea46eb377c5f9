//! Nodes command.

use std::fs::{self, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use herd_converge::gather::gather;
use herd_converge::Node;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{display_option, print_info, print_output, OutputFormat};

use super::CommandContext;

/// Length schematic identities are abbreviated to in tables.
const SCHEMATIC_WIDTH: usize = 12;

/// Show the state of every selected node.
#[derive(Debug, Args)]
pub struct NodesCommand {
    /// Output format.
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    /// Write every rendered machine configuration to `<dir>/<host>.yaml`.
    #[arg(long)]
    machineconfig_output: Option<PathBuf>,
}

#[derive(Debug, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct NodeRow {
    #[tabled(rename = "Host")]
    host: String,

    #[tabled(rename = "IP", display = "display_option")]
    ip: Option<String>,

    #[tabled(rename = "Role")]
    role: String,

    #[tabled(rename = "Stage")]
    stage: String,

    #[tabled(rename = "Ready")]
    ready: bool,

    #[tabled(rename = "Unmet Conditions", display = "display_option")]
    unmet_conditions: Option<String>,

    #[tabled(rename = "Schematic", display = "display_schematic")]
    schematic: String,

    #[tabled(rename = "Version", display = "display_option")]
    os_version: Option<String>,

    #[tabled(rename = "Error", display = "display_option")]
    error: Option<String>,
}

fn display_schematic(schematic: &str) -> String {
    if schematic.is_empty() {
        return "-".to_string();
    }
    schematic.chars().take(SCHEMATIC_WIDTH).collect()
}

impl From<&Node> for NodeRow {
    fn from(node: &Node) -> Self {
        Self {
            host: node.host().to_string(),
            ip: node.spec.ip.map(|ip| ip.to_string()),
            role: node.spec.role.to_string(),
            stage: node.stage.to_string(),
            ready: node.readiness.ready,
            unmet_conditions: (!node.readiness.unmet_conditions.is_empty())
                .then(|| node.readiness.unmet_summary()),
            schematic: node.schematic.clone(),
            os_version: (!node.os_version.is_empty()).then(|| node.os_version.clone()),
            error: node.gather_error.as_ref().map(|e| e.to_string()),
        }
    }
}

impl NodesCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let nodes = gather(&ctx.run_context()?).await;

        let rows: Vec<NodeRow> = nodes.iter().map(NodeRow::from).collect();
        print_output(&rows, self.output);

        if let Some(dir) = &self.machineconfig_output {
            let written = write_configs(dir, &nodes)?;
            print_info(&format!(
                "Wrote {written} machine configuration(s) to {}",
                dir.display()
            ));
        }
        Ok(())
    }
}

/// Write each node's rendered configuration to `<dir>/<host>.yaml`, mode 0600.
fn write_configs(dir: &Path, nodes: &[Node]) -> Result<usize> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = 0;
    for node in nodes {
        let Some(config) = &node.rendered_config else {
            continue;
        };
        let path = dir.join(format!("{}.yaml", node.host()));
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.set_permissions(Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict {}", path.display()))?;
        file.write_all(config)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}
