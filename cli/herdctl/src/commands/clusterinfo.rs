//! Cluster info command.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Args;
use herd_converge::secrets::SecretsBundle;
use herd_converge::NodeSpec;
use serde::Serialize;

use crate::config::ClusterFile;
use crate::output::print_yaml;

use super::CommandContext;

/// Print the non-sensitive cluster information as YAML.
#[derive(Debug, Args)]
pub struct ClusterinfoCommand {}

/// CA certificates only, never keys.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterInfo<'a> {
    cluster_name: &'a str,
    cluster_endpoint: &'a str,

    #[serde(rename = "clusterCA")]
    cluster_ca: String,

    #[serde(rename = "etcdCA")]
    etcd_ca: String,

    #[serde(rename = "osCA")]
    os_ca: String,

    kubernetes_version: Option<&'a str>,
    nodes: &'a [NodeSpec],
}

fn cluster_info<'a>(
    cluster: &'a ClusterFile,
    nodes: &'a [NodeSpec],
    bundle: &SecretsBundle,
) -> ClusterInfo<'a> {
    ClusterInfo {
        cluster_name: &cluster.cluster_name,
        cluster_endpoint: &cluster.cluster_endpoint,
        cluster_ca: STANDARD.encode(&bundle.certs.k8s.crt),
        etcd_ca: STANDARD.encode(&bundle.certs.etcd.crt),
        os_ca: STANDARD.encode(&bundle.certs.os.crt),
        kubernetes_version: cluster.kubernetes_version.as_deref(),
        nodes,
    }
}

impl ClusterinfoCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let bundle = ctx
            .secrets()
            .get()
            .await
            .context("Failed to load secrets bundle")?;
        print_yaml(&cluster_info(&ctx.cluster, &ctx.nodes, &bundle));
        Ok(())
    }
}
