//! Run-scoped context handed to every component.

use std::sync::Arc;

use herd_reconcile::never_cancelled;
use tokio::sync::watch;

use crate::api::Connector;
use crate::cluster::{sort_nodes, ClusterParams, NodeSpec};
use crate::prompt::{Prompter, StdinPrompter};
use crate::render::ConfigRenderer;

/// Everything one invocation needs: cluster parameters, the selected nodes
/// in processing order, the collaborators, and the cancellation signal.
#[derive(Clone)]
pub struct RunContext {
    pub cluster: ClusterParams,

    /// Sorted control-plane first, then by host.
    pub nodes: Vec<NodeSpec>,

    pub connector: Arc<dyn Connector>,
    pub renderer: Arc<dyn ConfigRenderer>,
    pub prompter: Arc<dyn Prompter>,

    shutdown: watch::Receiver<bool>,
}

impl RunContext {
    /// Create a new run context. `nodes` are sorted into processing order.
    pub fn new(
        cluster: ClusterParams,
        mut nodes: Vec<NodeSpec>,
        connector: Arc<dyn Connector>,
        renderer: Arc<dyn ConfigRenderer>,
    ) -> Self {
        sort_nodes(&mut nodes);
        Self {
            cluster,
            nodes,
            connector,
            renderer,
            prompter: Arc::new(StdinPrompter),
            shutdown: never_cancelled(),
        }
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Attach the run-wide cancellation signal.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// A fresh receiver for the cancellation signal.
    pub fn shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        herd_reconcile::is_cancelled(&self.shutdown)
    }
}
