//! Kubeconfig command.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Args;
use herd_converge::secrets::{self, CertAndKey, SecretsBundle};
use serde::Serialize;

use crate::output::print_yaml;

use super::CommandContext;

/// User name of the generated client certificate.
const KUBE_USER: &str = "herd";

/// Print a temporary admin kubeconfig with a freshly issued client certificate.
#[derive(Debug, Args)]
pub struct KubeconfigCommand {
    /// Validity of the client certificate, in hours.
    #[arg(long, default_value_t = 12, value_parser = clap::value_parser!(u64).range(1..))]
    validity_hours: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    clusters: Vec<NamedCluster>,
    contexts: Vec<NamedContext>,
    current_context: String,
    users: Vec<NamedUser>,
}

#[derive(Debug, Serialize)]
struct NamedCluster {
    name: String,
    cluster: KubeCluster,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct KubeCluster {
    server: String,
    certificate_authority_data: String,
}

#[derive(Debug, Serialize)]
struct NamedContext {
    name: String,
    context: KubeContext,
}

#[derive(Debug, Serialize)]
struct KubeContext {
    cluster: String,
    user: String,
}

#[derive(Debug, Serialize)]
struct NamedUser {
    name: String,
    user: KubeUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct KubeUser {
    client_certificate_data: String,
    client_key_data: String,
}

fn kubeconfig(cluster: &str, server: &str, bundle: &SecretsBundle, client: &CertAndKey) -> Kubeconfig {
    let context = format!("{KUBE_USER}@{cluster}");

    Kubeconfig {
        api_version: "v1",
        kind: "Config",
        clusters: vec![NamedCluster {
            name: cluster.to_string(),
            cluster: KubeCluster {
                server: server.to_string(),
                certificate_authority_data: STANDARD.encode(&bundle.certs.k8s.crt),
            },
        }],
        contexts: vec![NamedContext {
            name: context.clone(),
            context: KubeContext {
                cluster: cluster.to_string(),
                user: KUBE_USER.to_string(),
            },
        }],
        current_context: context,
        users: vec![NamedUser {
            name: KUBE_USER.to_string(),
            user: KubeUser {
                client_certificate_data: STANDARD.encode(&client.crt),
                client_key_data: STANDARD.encode(&client.key),
            },
        }],
    }
}

impl KubeconfigCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let bundle = ctx
            .secrets()
            .get()
            .await
            .context("Failed to load secrets bundle")?;

        let validity = Duration::from_secs(self.validity_hours * 3600);
        let client = secrets::kubernetes_client(&bundle, KUBE_USER, validity)
            .context("Failed to issue client certificate")?;

        print_yaml(&kubeconfig(
            &ctx.cluster.cluster_name,
            &ctx.cluster.cluster_endpoint,
            &bundle,
            &client,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use herd_converge::secrets::generate;

    use super::*;

    #[test]
    fn test_kubeconfig_layout() {
        let bundle = generate("demo").unwrap();
        let client = secrets::kubernetes_client(&bundle, KUBE_USER, Duration::from_secs(3600)).unwrap();

        let config = kubeconfig("demo", "https://cp.example.com:6443", &bundle, &client);
        let yaml = serde_yaml::to_string(&config).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["current-context"], "herd@demo");
        assert_eq!(value["clusters"][0]["cluster"]["server"], "https://cp.example.com:6443");
        assert_eq!(value["contexts"][0]["context"]["user"], "herd");

        let ca = value["clusters"][0]["cluster"]["certificate-authority-data"]
            .as_str()
            .unwrap();
        assert_eq!(STANDARD.decode(ca).unwrap(), bundle.certs.k8s.crt.as_bytes());
        let crt = value["users"][0]["user"]["client-certificate-data"]
            .as_str()
            .unwrap();
        assert_eq!(STANDARD.decode(crt).unwrap(), client.crt.as_bytes());
    }
}
