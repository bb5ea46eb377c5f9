//! Desired configuration rendering.

use async_trait::async_trait;
use serde::Deserialize;

use crate::cluster::{ClusterParams, NodeSpec};
use crate::error::{Error, Result};

/// Produces the machine configuration a node should run.
#[async_trait]
pub trait ConfigRenderer: Send + Sync {
    /// Render the ready-to-submit configuration for `node`.
    async fn render(&self, cluster: &ClusterParams, node: &NodeSpec) -> Result<Vec<u8>>;
}

#[derive(Deserialize)]
struct Document {
    machine: Option<Machine>,
}

#[derive(Deserialize)]
struct Machine {
    install: Option<Install>,
}

#[derive(Deserialize)]
struct Install {
    image: Option<String>,
}

/// Read `machine.install.image` from a rendered configuration.
///
/// The configuration may hold several YAML documents; the first one that
/// names an installer image wins.
pub fn installer_image(config: &[u8]) -> Result<String> {
    for document in serde_yaml::Deserializer::from_slice(config) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| Error::Render(format!("invalid machine configuration: {e}")))?;
        let Ok(document) = serde_yaml::from_value::<Document>(value) else {
            continue;
        };

        let image = document
            .machine
            .and_then(|m| m.install)
            .and_then(|i| i.image)
            .filter(|image| !image.is_empty());
        if let Some(image) = image {
            return Ok(image);
        }
    }

    Err(Error::Config(
        "machine configuration does not set machine.install.image".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installer_image_from_machine_config() {
        let config = b"version: v1alpha1\nmachine:\n  type: controlplane\n  install:\n    disk: /dev/sda\n    image: factory.example.com/installer/abc123:v1.9.2\n";
        assert_eq!(
            installer_image(config).unwrap(),
            "factory.example.com/installer/abc123:v1.9.2"
        );
    }

    #[test]
    fn test_installer_image_in_later_document() {
        let config = b"apiVersion: v1alpha1\nkind: HostnameConfig\nhostname: cp-1\n---\nmachine:\n  install:\n    image: registry/example.com/imagename:v1.9.2\n";
        assert_eq!(
            installer_image(config).unwrap(),
            "registry/example.com/imagename:v1.9.2"
        );
    }

    #[test]
    fn test_missing_installer_image_is_config_error() {
        let config = b"machine:\n  install:\n    disk: /dev/sda\n";
        assert!(matches!(installer_image(config), Err(Error::Config(_))));
    }
}
