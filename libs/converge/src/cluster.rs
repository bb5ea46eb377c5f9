//! Cluster parameters and node specifications.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque renderer data attached to the cluster or to a node.
pub type Data = BTreeMap<String, serde_json::Value>;

/// Role of a node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    ControlPlane,
    Worker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ControlPlane => "control-plane",
            Role::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "control-plane" | "controlplane" => Ok(Role::ControlPlane),
            "worker" => Ok(Role::Worker),
            other => Err(Error::Config(format!(
                "unknown node role {other:?} (expected control-plane or worker)"
            ))),
        }
    }
}

/// Static, user-declared node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Display and TLS verification identity.
    pub host: String,

    /// Literal address used to connect, when the host name is not resolvable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,

    pub role: Role,

    /// Renderer input; never interpreted by the engine.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: Data,
}

impl NodeSpec {
    /// Create a node spec without an explicit address.
    pub fn new(host: impl Into<String>, role: Role) -> Self {
        Self {
            host: host.into(),
            ip: None,
            role,
            data: Data::new(),
        }
    }

    /// Set the connection address.
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Address to dial: the literal `ip` if set, else `host`.
    pub fn endpoint(&self) -> String {
        match self.ip {
            Some(ip) => ip.to_string(),
            None => self.host.clone(),
        }
    }

    /// `endpoint:port`, bracketing IPv6 literals.
    pub fn authority(&self, port: u16) -> String {
        match self.ip {
            Some(IpAddr::V6(ip)) => format!("[{ip}]:{port}"),
            Some(IpAddr::V4(ip)) => format!("{ip}:{port}"),
            None => format!("{}:{port}", self.host),
        }
    }

    pub fn is_control_plane(&self) -> bool {
        self.role == Role::ControlPlane
    }

    /// Check the fields that cannot be expressed in the type.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("node host must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Order nodes control-plane first, then by host.
pub fn sort_nodes(nodes: &mut [NodeSpec]) {
    nodes.sort_by(|a, b| {
        (!a.is_control_plane(), &a.host).cmp(&(!b.is_control_plane(), &b.host))
    });
}

/// Cluster-wide parameters handed to the config renderer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterParams {
    pub name: String,

    /// Kubernetes API endpoint URL.
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: Data,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("control-plane", Role::ControlPlane)]
    #[case("controlplane", Role::ControlPlane)]
    #[case("worker", Role::Worker)]
    fn test_role_parses(#[case] input: &str, #[case] expected: Role) {
        assert_eq!(input.parse::<Role>().unwrap(), expected);
    }

    #[rstest]
    #[case("master")]
    #[case("Worker")]
    #[case("")]
    fn test_role_rejects_unknown(#[case] input: &str) {
        assert!(matches!(input.parse::<Role>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_role_serde_is_kebab_case() {
        let node: NodeSpec = serde_yaml::from_str("host: cp-1\nrole: control-plane\n").unwrap();
        assert_eq!(node.role, Role::ControlPlane);
        assert_eq!(serde_yaml::to_string(&Role::Worker).unwrap().trim(), "worker");
    }

    #[test]
    fn test_sort_puts_control_plane_first() {
        let mut nodes = vec![
            NodeSpec::new("worker-b", Role::Worker),
            NodeSpec::new("cp-2", Role::ControlPlane),
            NodeSpec::new("worker-a", Role::Worker),
            NodeSpec::new("cp-1", Role::ControlPlane),
        ];
        sort_nodes(&mut nodes);

        let hosts: Vec<_> = nodes.iter().map(|n| n.host.as_str()).collect();
        assert_eq!(hosts, ["cp-1", "cp-2", "worker-a", "worker-b"]);
    }

    #[test]
    fn test_endpoint_prefers_ip() {
        let node = NodeSpec::new("cp-1", Role::ControlPlane);
        assert_eq!(node.endpoint(), "cp-1");
        assert_eq!(node.authority(50000), "cp-1:50000");

        let node = node.with_ip("10.0.0.5".parse().unwrap());
        assert_eq!(node.endpoint(), "10.0.0.5");
        assert_eq!(node.authority(50000), "10.0.0.5:50000");

        let node = NodeSpec::new("cp-2", Role::ControlPlane).with_ip("fd00::5".parse().unwrap());
        assert_eq!(node.authority(50000), "[fd00::5]:50000");
    }

    #[test]
    fn test_validate_rejects_blank_host() {
        assert!(NodeSpec::new("  ", Role::Worker).validate().is_err());
        assert!(NodeSpec::new("w-1", Role::Worker).validate().is_ok());
    }
}
