//! CLI commands.

mod apply;
mod bootstrap;
mod clusterinfo;
mod kubeconfig;
mod nodes;
mod osconfig;
mod reset;
mod secrets;
mod upgrade;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use herd_converge::connect::TlsConnector;
use herd_converge::secrets::{SecretsCache, SecretsStore};
use herd_converge::{NodeSpec, RunContext};
use tokio::sync::watch;
use tracing::info;

use crate::config::{node_selector, validate_config_dir, ClusterFile, DEFAULT_CONFIG_FILE};
use crate::error::CliError;
use crate::logging::{self, LogFormat};
use crate::providers::{BinarySecretsStore, FileSecretsStore};
use crate::render::DirectoryRenderer;

/// herd - converge a cluster of immutable-OS nodes to its declared configuration.
#[derive(Debug, Parser)]
#[command(name = "herd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (debug, info, warn, error).
    #[arg(long, global = true, env = "HERD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Cluster file.
    #[arg(long, global = true, env = "HERD_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory holding the node configurations and the local secrets file.
    #[arg(long, global = true, env = "HERD_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,

    /// Regex selecting the nodes to work on, matched against the host.
    #[arg(long, global = true, env = "HERD_NODES")]
    nodes: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply the rendered configuration to every selected node.
    Apply(apply::ApplyCommand),

    /// Configure a fresh cluster and bootstrap etcd.
    Bootstrap(bootstrap::BootstrapCommand),

    /// Upgrade nodes whose OS image differs from the configured installer.
    Upgrade(upgrade::UpgradeCommand),

    /// Reset nodes, wiping their configuration.
    Reset(reset::ResetCommand),

    /// Show the state of every selected node.
    Nodes(nodes::NodesCommand),

    /// Print the cluster secrets bundle, generating it if needed.
    Secrets(secrets::SecretsCommand),

    /// Print an OS API client configuration for the cluster.
    #[command(alias = "talosconfig")]
    Osconfig(osconfig::OsconfigCommand),

    /// Print a temporary admin kubeconfig.
    Kubeconfig(kubeconfig::KubeconfigCommand),

    /// Print the non-sensitive cluster information.
    Clusterinfo(clusterinfo::ClusterinfoCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        logging::init(&self.log_level, self.log_format)?;

        if let Commands::Version = self.command {
            println!("herd {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        validate_config_dir(&self.config_dir)?;
        let cluster = ClusterFile::load(&self.config)?;
        let selector = node_selector(self.nodes.as_deref())?;
        let nodes = cluster.resolve_nodes(selector.as_ref()).await?;
        info!(
            cluster = %cluster.cluster_name,
            nodes = nodes.len(),
            "Configuration loaded"
        );

        let ctx = CommandContext {
            cluster,
            config_dir: self.config_dir,
            nodes,
            shutdown,
        };

        match self.command {
            Commands::Apply(cmd) => cmd.run(ctx).await,
            Commands::Bootstrap(cmd) => cmd.run(ctx).await,
            Commands::Upgrade(cmd) => cmd.run(ctx).await,
            Commands::Reset(cmd) => cmd.run(ctx).await,
            Commands::Nodes(cmd) => cmd.run(ctx).await,
            Commands::Secrets(cmd) => cmd.run(ctx).await,
            Commands::Osconfig(cmd) => cmd.run(ctx).await,
            Commands::Kubeconfig(cmd) => cmd.run(ctx).await,
            Commands::Clusterinfo(cmd) => cmd.run(ctx).await,
            Commands::Version => Ok(()),
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub cluster: ClusterFile,
    pub config_dir: PathBuf,
    /// Selected nodes in processing order.
    pub nodes: Vec<NodeSpec>,
    shutdown: watch::Receiver<bool>,
}

impl CommandContext {
    /// The configured secrets store: the provider binary, else `secrets.yaml`.
    pub fn secrets_store(&self) -> Arc<dyn SecretsStore> {
        match &self.cluster.secrets_provider {
            Some(binary) => Arc::new(BinarySecretsStore::new(binary)),
            None => Arc::new(FileSecretsStore::new(&self.config_dir)),
        }
    }

    /// A run-scoped, memoized view of the secrets bundle.
    pub fn secrets(&self) -> Arc<SecretsCache> {
        Arc::new(SecretsCache::new(
            self.cluster.cluster_name.clone(),
            self.secrets_store(),
        ))
    }

    /// Build the core run context over the selected nodes.
    pub fn run_context(&self) -> Result<RunContext> {
        if self.nodes.is_empty() {
            return Err(CliError::NoNodesSelected.into());
        }

        let connector = Arc::new(TlsConnector::new(self.secrets()));
        let renderer = Arc::new(DirectoryRenderer::new(&self.config_dir));
        Ok(RunContext::new(
            self.cluster.cluster_params(),
            self.nodes.clone(),
            connector,
            renderer,
        )
        .with_shutdown(self.shutdown.clone()))
    }
}
