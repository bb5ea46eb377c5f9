//! Cluster secrets bundle and its run-scoped cache.
//!
//! The bundle holds the PKI material needed to talk to nodes that already
//! have a cluster identity. It is read through [`SecretsCache`], which loads
//! it from the configured [`SecretsStore`] at most once per run and generates
//! (and stores) a fresh bundle if the store has none.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Organization granting full API access to the admin client certificate.
pub const ADMIN_ORGANIZATION: &str = "os:admin";

/// Kubernetes group bound to cluster-admin.
pub const KUBERNETES_ADMIN_GROUP: &str = "system:masters";

/// Validity of generated certificates.
const CERT_VALIDITY_DAYS: i64 = 3650;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsBundle {
    pub cluster: ClusterSecrets,
    pub certs: Certs,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSecrets {
    pub id: String,
    pub secret: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certs {
    /// OS API certificate authority.
    pub os: CertAndKey,
    /// Client certificate used by this tool.
    pub admin: CertAndKey,
    /// Kubernetes API certificate authority.
    pub k8s: CertAndKey,
    pub etcd: CertAndKey,
}

/// PEM encoded certificate and private key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertAndKey {
    pub crt: String,
    pub key: String,
}

impl fmt::Debug for SecretsBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsBundle")
            .field("cluster_id", &self.cluster.id)
            .finish_non_exhaustive()
    }
}

impl SecretsBundle {
    pub fn from_yaml(data: &str) -> Result<Self> {
        serde_yaml::from_str(data).map_err(|e| Error::Secrets(format!("invalid bundle: {e}")))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Secrets(format!("encode bundle: {e}")))
    }
}

/// Storage for secrets bundles, keyed by cluster name.
#[async_trait]
pub trait SecretsStore: Send + Sync {
    /// Load the bundle; `None` when nothing is stored yet.
    async fn get(&self, cluster: &str) -> Result<Option<SecretsBundle>>;

    async fn put(&self, cluster: &str, bundle: &SecretsBundle) -> Result<()>;
}

/// Memoized read-through access to the cluster's bundle.
pub struct SecretsCache {
    cluster: String,
    store: Arc<dyn SecretsStore>,
    bundle: Mutex<Option<Arc<SecretsBundle>>>,
}

impl SecretsCache {
    /// Create a new cache over `store`.
    pub fn new(cluster: impl Into<String>, store: Arc<dyn SecretsStore>) -> Self {
        Self {
            cluster: cluster.into(),
            store,
            bundle: Mutex::new(None),
        }
    }

    /// Return the bundle, loading or generating it on first use.
    pub async fn get(&self) -> Result<Arc<SecretsBundle>> {
        let mut cached = self.bundle.lock().await;
        if let Some(bundle) = cached.as_ref() {
            return Ok(Arc::clone(bundle));
        }

        let bundle = match self.store.get(&self.cluster).await? {
            Some(bundle) => {
                debug!(cluster = %self.cluster, "Loaded secrets bundle");
                bundle
            }
            None => {
                info!(cluster = %self.cluster, "No secrets bundle found, generating a new one");
                let bundle = generate(&self.cluster)?;
                self.store.put(&self.cluster, &bundle).await?;
                bundle
            }
        };

        let bundle = Arc::new(bundle);
        *cached = Some(Arc::clone(&bundle));
        Ok(bundle)
    }
}

/// Generate a new bundle: self-signed OS, Kubernetes and etcd CAs, and an
/// admin certificate signed by the OS CA.
pub fn generate(cluster: &str) -> Result<SecretsBundle> {
    let (os_cert, os_key) = certificate_authority(distinguished_name(cluster, None))?;
    let (k8s_cert, k8s_key) = certificate_authority(distinguished_name("kubernetes", None))?;
    let (etcd_cert, etcd_key) = certificate_authority(distinguished_name("etcd", None))?;

    let admin_key = KeyPair::generate().map_err(pki_error)?;
    let mut admin_params = CertificateParams::new(Vec::<String>::new()).map_err(pki_error)?;
    admin_params.distinguished_name = distinguished_name(ADMIN_ORGANIZATION, Some("admin"));
    admin_params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    admin_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    set_validity(&mut admin_params);
    let admin_cert = admin_params
        .signed_by(&admin_key, &os_cert, &os_key)
        .map_err(pki_error)?;

    Ok(SecretsBundle {
        cluster: ClusterSecrets {
            id: random_token(),
            secret: random_token(),
        },
        certs: Certs {
            os: CertAndKey {
                crt: os_cert.pem(),
                key: os_key.serialize_pem(),
            },
            admin: CertAndKey {
                crt: admin_cert.pem(),
                key: admin_key.serialize_pem(),
            },
            k8s: CertAndKey {
                crt: k8s_cert.pem(),
                key: k8s_key.serialize_pem(),
            },
            etcd: CertAndKey {
                crt: etcd_cert.pem(),
                key: etcd_key.serialize_pem(),
            },
        },
    })
}

/// Issue a short-lived Kubernetes client certificate for `user` in the admin
/// group, signed by the bundle's Kubernetes CA.
pub fn kubernetes_client(bundle: &SecretsBundle, user: &str, validity: Duration) -> Result<CertAndKey> {
    let ca_key = KeyPair::from_pem(&bundle.certs.k8s.key)
        .map_err(|e| Error::Secrets(format!("read Kubernetes CA key: {e}")))?;
    let ca_cert = CertificateParams::from_ca_cert_pem(&bundle.certs.k8s.crt)
        .and_then(|params| params.self_signed(&ca_key))
        .map_err(|e| Error::Secrets(format!("read Kubernetes CA certificate: {e}")))?;

    let key = KeyPair::generate().map_err(pki_error)?;
    let mut params = CertificateParams::new(Vec::<String>::new()).map_err(pki_error)?;
    params.distinguished_name = distinguished_name(KUBERNETES_ADMIN_GROUP, Some(user));
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::seconds(1);
    params.not_after = now + validity;
    let cert = params.signed_by(&key, &ca_cert, &ca_key).map_err(pki_error)?;

    Ok(CertAndKey {
        crt: cert.pem(),
        key: key.serialize_pem(),
    })
}

fn certificate_authority(name: DistinguishedName) -> Result<(rcgen::Certificate, KeyPair)> {
    let key = KeyPair::generate().map_err(pki_error)?;
    let mut params = CertificateParams::new(Vec::<String>::new()).map_err(pki_error)?;
    params.distinguished_name = name;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    set_validity(&mut params);
    let cert = params.self_signed(&key).map_err(pki_error)?;
    Ok((cert, key))
}

fn distinguished_name(organization: &str, common_name: Option<&str>) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, organization);
    if let Some(cn) = common_name {
        dn.push(DnType::CommonName, cn);
    }
    dn
}

// Backdated by a second to tolerate clock skew with the nodes.
fn set_validity(params: &mut CertificateParams) {
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::seconds(1);
    params.not_after = now + time::Duration::days(CERT_VALIDITY_DAYS);
}

fn random_token() -> String {
    STANDARD.encode(rand::random::<[u8; 32]>())
}

fn pki_error(err: rcgen::Error) -> Error {
    Error::Secrets(format!("generate certificates: {err}"))
}
