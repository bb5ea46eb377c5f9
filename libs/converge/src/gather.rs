//! Node state gathering.
//!
//! Every configured node is read by its own concurrent unit of work. A
//! failing node keeps its error in [`Node::gather_error`]; siblings are never
//! cancelled and the result always has one entry per configured node, in
//! configuration order.

use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::cluster::NodeSpec;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::node::Node;

/// Schematic of the stock OS image, used when no `schematic` extension is installed.
pub const DEFAULT_SCHEMATIC: &str =
    "376567988ad370138ad8b2698212367b8edcb69b5fd68c80be1f2ec7d603b4ba";

/// Name of the extension carrying the schematic id as its version.
pub const SCHEMATIC_EXTENSION: &str = "schematic";

/// Upper bound on nodes read at the same time.
pub const GATHER_CONCURRENCY: usize = 16;

/// Gather the state of every node in the context.
pub async fn gather(ctx: &RunContext) -> Vec<Node> {
    stream::iter(ctx.nodes.iter().cloned())
        .map(|spec| gather_node(ctx, spec))
        .buffered(GATHER_CONCURRENCY)
        .collect()
        .await
}

/// Gather one node; never fails, errors are recorded on the node.
pub async fn gather_node(ctx: &RunContext, spec: NodeSpec) -> Node {
    let mut node = Node::new(spec);

    match collect(ctx, &mut node).await {
        Ok(()) => debug!(
            node = %node.host(),
            stage = %node.stage,
            ready = node.readiness.ready,
            version = %node.os_version,
            "Gathered node state"
        ),
        Err(err) => {
            warn!(node = %node.host(), error = %err, "Failed to gather node state");
            node.gather_error = Some(err);
        }
    }

    node
}

async fn collect(ctx: &RunContext, node: &mut Node) -> Result<()> {
    let client = ctx
        .connector
        .connect(&node.spec)
        .await
        .map_err(Error::during("connect"))?;

    let status = client
        .machine_status()
        .await
        .map_err(Error::from)
        .map_err(Error::during("read machine status"))?;
    node.stage = status.stage;
    node.readiness = status.readiness;

    let extensions = client
        .extensions()
        .await
        .map_err(Error::from)
        .map_err(Error::during("list extensions"))?;
    node.schematic = extensions
        .into_iter()
        .find(|ext| ext.name == SCHEMATIC_EXTENSION)
        .map(|ext| ext.version)
        .unwrap_or_else(|| DEFAULT_SCHEMATIC.to_string());

    node.os_version = client
        .os_version()
        .await
        .map_err(Error::from)
        .map_err(Error::during("read version"))?;

    let config = ctx
        .renderer
        .render(&ctx.cluster, &node.spec)
        .await
        .map_err(Error::during("render configuration"))?;
    node.rendered_config = Some(config);

    Ok(())
}
