//! Post-change stabilization watchdog.
//!
//! A node is stable once it has reported running and ready for a continuous
//! window. Each attempt subscribes to the node's events before reading the
//! baseline status, so a transition between the two is never missed; any
//! destabilizing event during the window starts a fresh attempt.

use std::time::Duration;

use futures_util::StreamExt;
use herd_reconcile::{cancelled, retry, Attempt, RetryBudget, DEFAULT_RETRY_INTERVAL};
use tracing::{debug, info, info_span, Instrument};

use crate::api::NodeEvent;
use crate::cluster::NodeSpec;
use crate::context::RunContext;
use crate::error::{Error, Result};

/// Healthy window required after apply and upgrade.
pub const STABLE_WINDOW: Duration = Duration::from_secs(30);

/// Overall budget for a node to stabilize.
pub const STABILIZE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Slack on top of the window before a single attempt is abandoned.
const ATTEMPT_SLACK: Duration = Duration::from_secs(60);

/// Budget used for a given stable window.
pub fn budget(window: Duration) -> RetryBudget {
    RetryBudget::constant(STABILIZE_TIMEOUT, DEFAULT_RETRY_INTERVAL)
        .with_attempt_timeout(window + ATTEMPT_SLACK)
}

/// Block until `node` has been running and ready for `window`.
pub async fn wait_stable(ctx: &RunContext, node: &NodeSpec, window: Duration) -> Result<()> {
    let span = info_span!("stabilize", node = %node.host);

    async {
        info!(window = ?window, "Waiting for node to stabilize");
        retry(budget(window), ctx.shutdown(), || attempt(ctx, node, window))
            .await
            .map_err(|err| {
                Error::from_retry(err, |reason| Error::Stabilize {
                    host: node.host.clone(),
                    reason,
                })
            })?;
        info!("Node is stable");
        Ok(())
    }
    .instrument(span)
    .await
}

async fn attempt(ctx: &RunContext, node: &NodeSpec, window: Duration) -> Attempt<(), Error> {
    let client = match ctx.connector.connect(node).await {
        Ok(client) => client,
        Err(err) => return Attempt::retry(err),
    };

    // Subscribe first; the baseline read below must not race a transition.
    let mut events = match client.watch_events().await {
        Ok(events) => events,
        Err(err) => return Attempt::retry(format!("subscribe to events: {err}")),
    };

    let baseline = match client.machine_status().await {
        Ok(status) => status,
        Err(err) => return Attempt::retry(format!("read machine status: {err}")),
    };
    if let Err(reason) = baseline.check_healthy() {
        return Attempt::Retry(reason);
    }

    debug!(window = ?window, "Baseline healthy, watching for changes");
    let mut shutdown = ctx.shutdown();
    let timer = tokio::time::sleep(window);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            _ = &mut timer => return Attempt::Success(()),
            _ = cancelled(&mut shutdown) => return Attempt::Fatal(Error::Cancelled),
            event = events.next() => match event {
                None => return Attempt::retry("event stream closed"),
                Some(Err(err)) => return Attempt::retry(format!("event stream: {err}")),
                Some(Ok(NodeEvent::MachineStatus(status))) => {
                    if let Err(reason) = status.check_healthy() {
                        debug!(reason = %reason, "Node destabilized during window");
                        return Attempt::Retry(reason);
                    }
                }
                Some(Ok(NodeEvent::Other { type_url })) => {
                    debug!(type_url = %type_url, "Ignoring unrelated event");
                }
            },
        }
    }
}
