//! Cluster file loading and node selection.
//!
//! Handles:
//! - The YAML cluster file (`herd.yaml` by default)
//! - Extra nodes from an external nodes provider
//! - The `--nodes` selection pattern

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use herd_converge::cluster::{sort_nodes, Data};
use herd_converge::{ClusterParams, NodeSpec};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::providers::run_binary;

/// Default cluster file name.
pub const DEFAULT_CONFIG_FILE: &str = "herd.yaml";

/// The cluster file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterFile {
    pub cluster_name: String,

    /// Kubernetes API endpoint URL.
    pub cluster_endpoint: String,

    #[serde(default)]
    pub kubernetes_version: Option<String>,

    /// Binary storing the secrets bundle instead of the local `secrets.yaml`.
    #[serde(default)]
    pub secrets_provider: Option<PathBuf>,

    /// Binary listing additional nodes.
    #[serde(default)]
    pub nodes_provider: Option<PathBuf>,

    #[serde(default)]
    pub data: Data,

    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl ClusterFile {
    /// Load and validate the cluster file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read cluster file {}", path.display()))?;

        Self::parse(&contents).with_context(|| format!("Invalid cluster file {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(contents)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        if self.cluster_name.trim().is_empty() {
            bail!("clusterName must not be empty");
        }
        if !self.cluster_endpoint.contains("://") {
            bail!(
                "clusterEndpoint must be a URL, got {:?}",
                self.cluster_endpoint
            );
        }
        for node in &self.nodes {
            node.validate()?;
        }
        Ok(())
    }

    /// Parameters handed to the config renderer.
    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            name: self.cluster_name.clone(),
            endpoint: self.cluster_endpoint.clone(),
            kubernetes_version: self.kubernetes_version.clone(),
            data: self.data.clone(),
        }
    }

    /// Static and provider nodes matching `selector`, in processing order.
    pub async fn resolve_nodes(&self, selector: Option<&Regex>) -> Result<Vec<NodeSpec>> {
        let mut nodes = self.nodes.clone();

        if let Some(provider) = &self.nodes_provider {
            let output = run_binary(provider, &["nodes", &self.cluster_name], None)
                .await
                .context("Failed to load nodes from provider")?;
            let provided = parse_provider_nodes(&output)?;
            debug!(count = provided.len(), provider = %provider.display(), "Loaded provider nodes");
            nodes.extend(provided);
        }

        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.host.as_str()) {
                bail!("node {} is declared more than once", node.host);
            }
        }

        if let Some(selector) = selector {
            nodes.retain(|node| selector.is_match(&node.host));
        }
        sort_nodes(&mut nodes);
        Ok(nodes)
    }
}

/// Parse the YAML node list printed by a nodes provider.
pub fn parse_provider_nodes(output: &[u8]) -> Result<Vec<NodeSpec>> {
    if output.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let nodes: Vec<NodeSpec> =
        serde_yaml::from_slice(output).context("Failed to parse nodes from provider")?;
    for node in &nodes {
        node.validate()?;
    }
    Ok(nodes)
}

/// Compile the `--nodes` pattern; an empty pattern selects everything.
pub fn node_selector(pattern: Option<&str>) -> Result<Option<Regex>> {
    match pattern.filter(|p| !p.is_empty()) {
        Some(pattern) => Regex::new(pattern)
            .map(Some)
            .with_context(|| format!("Invalid nodes selector regex {pattern:?}")),
        None => Ok(None),
    }
}

/// The config directory must exist and be a directory.
pub fn validate_config_dir(path: &Path) -> Result<()> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            bail!("config directory does not exist: {}", path.display())
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to access config directory {}", path.display()))
        }
    };
    if !metadata.is_dir() {
        bail!("config path is not a directory: {}", path.display());
    }
    Ok(())
}
