//! OS client configuration command.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Args;
use herd_converge::secrets::SecretsBundle;
use herd_converge::NodeSpec;
use serde::Serialize;

use crate::output::print_yaml;

use super::CommandContext;

/// Print an OS API client configuration built from the secrets bundle.
#[derive(Debug, Args)]
pub struct OsconfigCommand {}

#[derive(Debug, Serialize)]
struct ClientConfig {
    context: String,
    contexts: BTreeMap<String, ClientContext>,
}

#[derive(Debug, Serialize)]
struct ClientContext {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    endpoints: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<String>,

    ca: String,
    crt: String,
    key: String,
}

/// Endpoints are only pinned for a single node; with several, the operator
/// picks them per command.
fn client_config(cluster: &str, nodes: &[NodeSpec], bundle: &SecretsBundle) -> ClientConfig {
    let endpoints = match nodes {
        [node] => vec![node.endpoint()],
        _ => Vec::new(),
    };

    let context = ClientContext {
        nodes: endpoints.clone(),
        endpoints,
        ca: STANDARD.encode(&bundle.certs.os.crt),
        crt: STANDARD.encode(&bundle.certs.admin.crt),
        key: STANDARD.encode(&bundle.certs.admin.key),
    };

    ClientConfig {
        context: cluster.to_string(),
        contexts: BTreeMap::from([(cluster.to_string(), context)]),
    }
}

impl OsconfigCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let bundle = ctx
            .secrets()
            .get()
            .await
            .context("Failed to load secrets bundle")?;
        print_yaml(&client_config(&ctx.cluster.cluster_name, &ctx.nodes, &bundle));
        Ok(())
    }
}
