//! etcd bootstrap.
//!
//! [`ensure_bootstrapped`] is idempotent: it issues the Bootstrap RPC only
//! while etcd on the seed node reports `Preparing`, and treats a running etcd
//! with members as already bootstrapped. It returns as soon as the RPC is
//! accepted; it does not wait for etcd to become quorate.
//!
//! [`bootstrap_cluster`] is the whole fresh-cluster flow behind the
//! `bootstrap` command.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};

use herd_reconcile::{retry, Attempt, RetryBudget};

use crate::apply::{self, ApplyOptions, ApplyOutcome};
use crate::cluster::NodeSpec;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::gather::gather;
use crate::node::Node;
use crate::preflight::{self, Policy};
use crate::stabilize::{self, STABLE_WINDOW};

/// Service whose state gates the bootstrap.
pub const ETCD_SERVICE: &str = "etcd";

/// Retry budget of the bootstrap loop.
pub const BOOTSTRAP_BUDGET: RetryBudget =
    RetryBudget::constant(Duration::from_secs(10 * 60), Duration::from_secs(5))
        .with_attempt_timeout(Duration::from_secs(15));

/// What the coordinator did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapOutcome {
    /// The Bootstrap RPC was accepted.
    Initiated,
    /// etcd was already running with members.
    AlreadyBootstrapped,
    /// No control-plane node in scope; nothing to do.
    NoControlPlane,
}

/// Make sure etcd has been bootstrapped on the first control-plane node of `nodes`.
pub async fn ensure_bootstrapped(ctx: &RunContext, nodes: &[Node]) -> Result<BootstrapOutcome> {
    let Some(seed) = nodes.iter().map(|n| &n.spec).find(|s| s.is_control_plane()) else {
        warn!("No control-plane node in scope, skipping bootstrap");
        return Ok(BootstrapOutcome::NoControlPlane);
    };

    let span = info_span!("bootstrap", node = %seed.host);
    async {
        info!("Bootstrapping etcd");
        let outcome = retry(BOOTSTRAP_BUDGET, ctx.shutdown(), || attempt(ctx, seed))
            .await
            .map_err(|err| Error::from_retry(err, Error::Bootstrap))?;

        match outcome {
            BootstrapOutcome::AlreadyBootstrapped => info!("etcd is already bootstrapped"),
            _ => info!("Bootstrap accepted"),
        }
        Ok(outcome)
    }
    .instrument(span)
    .await
}

async fn attempt(ctx: &RunContext, seed: &NodeSpec) -> Attempt<BootstrapOutcome, Error> {
    let client = match ctx.connector.connect(seed).await {
        Ok(client) => client,
        Err(err) => return Attempt::retry(err),
    };

    let state = match client.service_state(ETCD_SERVICE).await {
        Ok(Some(state)) => state,
        Ok(None) => return Attempt::retry("etcd service not found"),
        Err(err) => return Attempt::retry(format!("read etcd state: {err}")),
    };
    debug!(state = %state, "etcd service state");

    if state.eq_ignore_ascii_case("preparing") {
        return match client.bootstrap().await {
            Ok(()) => Attempt::Success(BootstrapOutcome::Initiated),
            Err(err) => Attempt::retry(format!("bootstrap rpc: {err}")),
        };
    }

    if state.eq_ignore_ascii_case("running") {
        let members = client.etcd_member_count().await.unwrap_or(0);
        if members > 0 {
            return Attempt::Success(BootstrapOutcome::AlreadyBootstrapped);
        }
    }

    Attempt::retry(format!("etcd not ready for bootstrap, state: {state}"))
}

/// Bootstrap options; apply behavior follows the confirm flag.
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub confirm: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self { confirm: true }
    }
}

/// Result of a fresh-cluster bootstrap.
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub outcomes: Vec<(String, ApplyOutcome)>,
    pub bootstrap: BootstrapOutcome,
}

/// Configure maintenance nodes, bootstrap etcd, and wait for every node to stabilize.
pub async fn bootstrap_cluster(ctx: &RunContext, options: &BootstrapOptions) -> Result<BootstrapReport> {
    match ctx.nodes.first() {
        Some(first) if first.is_control_plane() => {}
        Some(first) => {
            return Err(Error::Config(format!(
                "first node {} must be a control-plane node to bootstrap",
                first.host
            )))
        }
        None => return Err(Error::Config("no nodes configured".to_string())),
    }

    let nodes = gather(ctx).await;
    let eligible = preflight::check(nodes, &Policy::bootstrap())?;

    let apply_options = ApplyOptions {
        confirm: options.confirm,
        ..ApplyOptions::default()
    };
    let outcomes = apply::apply_nodes(ctx, &eligible.nodes, &apply_options, false).await?;

    let bootstrap = ensure_bootstrapped(ctx, &eligible.nodes).await?;

    for node in &eligible.nodes {
        stabilize::wait_stable(ctx, &node.spec, STABLE_WINDOW).await?;
    }

    Ok(BootstrapReport {
        outcomes,
        bootstrap,
    })
}
