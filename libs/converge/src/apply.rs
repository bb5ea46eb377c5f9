//! Two-phase configuration apply.
//!
//! Per node, in order: dry-run, detect no-op, confirm, commit. The first
//! node that fails aborts the run; nodes after it are never contacted.
//! A changed node is stabilized before the next node is touched.

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::api::ApplyRequest;
use crate::bootstrap::{self, BootstrapOutcome};
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::gather::gather;
use crate::node::Node;
use crate::preflight::{self, Policy};
use crate::stabilize::{self, STABLE_WINDOW};

/// Trailing marker of a dry-run that would change nothing.
pub const NO_CHANGES_SENTINEL: &str = "\nNo changes.";

/// Whether dry-run change details describe a no-op.
pub fn is_no_op(mode_details: &str) -> bool {
    mode_details.ends_with(NO_CHANGES_SENTINEL)
}

/// Apply run options.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Show changes only, never commit.
    pub dry_run: bool,

    /// Ask the operator before every commit.
    pub confirm: bool,

    pub skip_post_apply_checks: bool,
    pub skip_problematic_nodes: bool,

    /// Accept nodes that are not ready.
    pub allow_not_ready: bool,

    /// Bootstrap etcd after applying.
    pub auto_bootstrap: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            confirm: true,
            skip_post_apply_checks: false,
            skip_problematic_nodes: false,
            allow_not_ready: false,
            auto_bootstrap: false,
        }
    }
}

/// Per-node result of the apply protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ApplyOutcome {
    pub changed: bool,
    pub skipped: bool,
}

impl ApplyOutcome {
    pub const UNCHANGED: Self = Self {
        changed: false,
        skipped: false,
    };
    pub const CHANGED: Self = Self {
        changed: true,
        skipped: false,
    };
    pub const SKIPPED: Self = Self {
        changed: false,
        skipped: true,
    };
}

/// Result of an apply run.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    /// Outcome per host, in processing order.
    pub outcomes: Vec<(String, ApplyOutcome)>,

    pub bootstrap: Option<BootstrapOutcome>,
}

impl ApplyReport {
    pub fn changed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.changed).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.skipped).count()
    }
}

/// Gather, check and apply every node in the context.
pub async fn run(ctx: &RunContext, options: &ApplyOptions) -> Result<ApplyReport> {
    let nodes = gather(ctx).await;
    let policy = Policy::apply()
        .require_ready(!options.allow_not_ready)
        .skip_problematic(options.skip_problematic_nodes);
    let eligible = preflight::check(nodes, &policy)?;

    let mut stabilize = !options.skip_post_apply_checks;
    if stabilize && eligible.all_maintenance {
        info!("all nodes are in maintenance stage. ignoring the post-apply checks");
        stabilize = false;
    }

    let outcomes = apply_nodes(ctx, &eligible.nodes, options, stabilize).await?;
    let mut report = ApplyReport {
        outcomes,
        bootstrap: None,
    };

    if options.auto_bootstrap && !options.dry_run {
        report.bootstrap = Some(bootstrap::ensure_bootstrapped(ctx, &eligible.nodes).await?);
    }

    Ok(report)
}

/// Apply `nodes` in order. With `stabilize` set, each changed node must
/// settle before the next one is applied.
pub async fn apply_nodes(
    ctx: &RunContext,
    nodes: &[Node],
    options: &ApplyOptions,
    stabilize: bool,
) -> Result<Vec<(String, ApplyOutcome)>> {
    let mut outcomes = Vec::with_capacity(nodes.len());

    for node in nodes {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let outcome = apply_node(ctx, node, options)
            .instrument(info_span!("apply", node = %node.host()))
            .await?;
        outcomes.push((node.host().to_string(), outcome));

        if stabilize && !options.dry_run && outcome.changed {
            stabilize::wait_stable(ctx, &node.spec, STABLE_WINDOW).await?;
        }
    }

    Ok(outcomes)
}

/// Run the two-phase protocol against one node.
pub async fn apply_node(ctx: &RunContext, node: &Node, options: &ApplyOptions) -> Result<ApplyOutcome> {
    let host = node.host();
    let config = node
        .rendered_config
        .as_ref()
        .ok_or_else(|| Error::Render(format!("no configuration rendered for {host}")))?;

    let client = ctx.connector.connect(&node.spec).await?;
    let apply_error = |error| Error::Apply {
        host: host.to_string(),
        error,
    };

    let preview = client
        .apply_configuration(ApplyRequest {
            data: config.clone(),
            dry_run: true,
        })
        .await
        .map_err(apply_error)?;

    if is_no_op(&preview.mode_details) {
        info!("No changes to apply");
        return Ok(ApplyOutcome::UNCHANGED);
    }

    for warning in &preview.warnings {
        warn!(warning = %warning, "Configuration warning");
    }

    if options.dry_run {
        info!(mode = %preview.mode, "Dry run, not applying");
        ctx.prompter.show(&preview.mode_details);
        return Ok(ApplyOutcome::UNCHANGED);
    }

    if options.confirm {
        ctx.prompter.show(&preview.mode_details);
        let question = format!(
            "Do you want to apply the above changes to {host} (Mode: {})?",
            preview.mode
        );
        if !ctx.prompter.confirm(&question).await? {
            info!("Skipped by operator");
            return Ok(ApplyOutcome::SKIPPED);
        }
    }

    client
        .apply_configuration(ApplyRequest {
            data: config.clone(),
            dry_run: false,
        })
        .await
        .map_err(apply_error)?;

    info!(mode = %preview.mode, "Configuration applied");
    Ok(ApplyOutcome::CHANGED)
}
