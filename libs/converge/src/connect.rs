//! Connection selection.
//!
//! Nodes in maintenance have no PKI yet and serve the API without client
//! authentication; provisioned nodes require the cluster's admin
//! certificate. Which one we are talking to is decided by a probe handshake:
//! if the server asks for a client certificate, the node is provisioned.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper_util::rt::TokioIo;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::ResolvesClientCert;
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tonic::codegen::http::Uri;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::api::{Connector, NodeApi};
use crate::cluster::NodeSpec;
use crate::error::{Error, Result};
use crate::secrets::{SecretsBundle, SecretsCache};
use crate::transport::GrpcNode;

/// Port of the node management API.
pub const MANAGEMENT_PORT: u16 = 50000;

/// Upper bound for the probe handshake.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Transport security a node expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Client certificate signed by the cluster CA.
    MutualTls,
    /// Server certificate is not verified and no client certificate is sent.
    Insecure,
}

/// Probe `authority` (`host:port`) and report which mode it expects.
pub async fn probe(authority: &str, server_name: &str) -> Result<ConnectionMode> {
    let connect_error = |reason: String| Error::Connect {
        endpoint: authority.to_string(),
        reason,
    };

    let requested = Arc::new(AtomicBool::new(false));
    let config = probe_config(Arc::clone(&requested))?;
    let server_name = server_name_for(server_name).map_err(|e| connect_error(e.to_string()))?;

    let handshake = async {
        let tcp = TcpStream::connect(authority).await?;
        tokio_rustls::TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
    };
    let result = tokio::time::timeout(PROBE_TIMEOUT, handshake)
        .await
        .map_err(|_| connect_error(format!("probe timed out after {PROBE_TIMEOUT:?}")))?;

    if requested.load(Ordering::SeqCst) {
        return Ok(ConnectionMode::MutualTls);
    }
    match result {
        Ok(_) => Ok(ConnectionMode::Insecure),
        Err(e) => Err(connect_error(e.to_string())),
    }
}

/// Connector that probes each node and dials it over TLS.
pub struct TlsConnector {
    secrets: Arc<SecretsCache>,
}

impl TlsConnector {
    /// Create a new connector using the cluster's secrets for provisioned nodes.
    pub fn new(secrets: Arc<SecretsCache>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self, node: &NodeSpec) -> Result<Arc<dyn NodeApi>> {
        let authority = node.authority(MANAGEMENT_PORT);
        let mode = probe(&authority, &node.host).await?;
        debug!(node = %node.host, endpoint = %authority, mode = ?mode, "Selected connection mode");

        let config = match mode {
            ConnectionMode::MutualTls => {
                let bundle = self.secrets.get().await?;
                authenticated_config(&bundle).map_err(|e| Error::Client {
                    host: node.host.clone(),
                    reason: e.to_string(),
                })?
            }
            ConnectionMode::Insecure => insecure_config()?,
        };

        let channel = channel(&authority, &node.host, config).await?;
        Ok(Arc::new(GrpcNode::new(channel)))
    }
}

/// Open a gRPC channel to `authority` through a rustls connector.
pub async fn channel(authority: &str, server_name: &str, config: ClientConfig) -> Result<Channel> {
    let connect_error = |reason: String| Error::Connect {
        endpoint: authority.to_string(),
        reason,
    };

    let server_name = server_name_for(server_name).map_err(|e| connect_error(e.to_string()))?;
    let tls = tokio_rustls::TlsConnector::from(Arc::new(config));
    let target = authority.to_string();

    let endpoint = Endpoint::from_shared(format!("http://{authority}"))
        .map_err(|e| connect_error(e.to_string()))?
        .connect_timeout(PROBE_TIMEOUT);

    endpoint
        .connect_with_connector(tower::service_fn(move |_: Uri| {
            let tls = tls.clone();
            let server_name = server_name.clone();
            let target = target.clone();
            async move {
                let tcp = TcpStream::connect(target).await?;
                let stream = tls.connect(server_name, tcp).await?;
                Ok::<_, io::Error>(TokioIo::new(stream))
            }
        }))
        .await
        .map_err(|e| connect_error(e.to_string()))
}

// =============================================================================
// rustls configuration
// =============================================================================

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn finish(mut config: ClientConfig) -> ClientConfig {
    config.alpn_protocols = vec![b"h2".to_vec()];
    config
}

fn tls_error(err: rustls::Error) -> Error {
    Error::Config(format!("tls: {err}"))
}

fn probe_config(requested: Arc<AtomicBool>) -> Result<ClientConfig> {
    let provider = provider();
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier::new(&provider)))
        .with_client_cert_resolver(Arc::new(RecordingResolver { requested }));
    Ok(finish(config))
}

/// Client config for nodes in maintenance.
pub fn insecure_config() -> Result<ClientConfig> {
    let provider = provider();
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier::new(&provider)))
        .with_no_client_auth();
    Ok(finish(config))
}

/// Client config trusting the bundle CA and presenting the admin certificate.
pub fn authenticated_config(bundle: &SecretsBundle) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certs(&bundle.certs.os.crt)? {
        roots.add(cert).map_err(tls_error)?;
    }

    let chain = parse_certs(&bundle.certs.admin.crt)?;
    let key = rustls_pemfile::private_key(&mut bundle.certs.admin.key.as_bytes())
        .map_err(|e| Error::Secrets(format!("read admin key: {e}")))?
        .ok_or_else(|| Error::Secrets("admin key is missing".to_string()))?;

    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(tls_error)?
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(tls_error)?;
    Ok(finish(config))
}

fn parse_certs(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| Error::Secrets(format!("read certificate: {e}")))?;
    if certs.is_empty() {
        return Err(Error::Secrets("no certificate found in PEM data".to_string()));
    }
    Ok(certs)
}

fn server_name_for(name: &str) -> Result<ServerName<'static>, rustls::pki_types::InvalidDnsNameError> {
    ServerName::try_from(name.to_string())
}

/// Accepts any server certificate; signatures are still checked.
#[derive(Debug)]
struct NoVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl NoVerifier {
    fn new(provider: &CryptoProvider) -> Self {
        Self {
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Records a client certificate request and answers with no certificate.
#[derive(Debug)]
struct RecordingResolver {
    requested: Arc<AtomicBool>,
}

impl ResolvesClientCert for RecordingResolver {
    fn resolve(
        &self,
        _root_hint_subjects: &[&[u8]],
        _sigschemes: &[SignatureScheme],
    ) -> Option<Arc<CertifiedKey>> {
        self.requested.store(true, Ordering::SeqCst);
        None
    }

    fn has_certs(&self) -> bool {
        true
    }
}
