//! External providers: secrets stores and the nodes provider binary.

use std::fs::Permissions;
use std::io::Write as _;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use herd_converge::secrets::{SecretsBundle, SecretsStore};
use herd_converge::Error;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::CliError;

/// File name of the local secrets bundle inside the config directory.
pub const SECRETS_FILE: &str = "secrets.yaml";

const SOPS: &str = "sops";

/// Run `binary` with `args`, feeding `stdin` if given, and return its stdout.
///
/// The child's stderr is passed through to ours.
pub async fn run_binary(
    binary: &Path,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> Result<Vec<u8>, CliError> {
    let process_error = |action, error| CliError::Process {
        action,
        binary: binary.display().to_string(),
        error,
    };

    let mut child = Command::new(binary)
        .args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| process_error("run", e))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input)
            .await
            .map_err(|e| process_error("write to", e))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| process_error("wait for", e))?;
    if !output.status.success() {
        return Err(CliError::ProcessFailed {
            command: format!("{} {}", binary.display(), args.join(" ")),
            status: output.status,
        });
    }
    Ok(output.stdout)
}

// =============================================================================
// Filesystem store
// =============================================================================

/// `secrets.yaml` in the config directory, optionally sops-encrypted.
pub struct FileSecretsStore {
    path: PathBuf,
}

#[derive(Deserialize)]
struct SopsFileStatus {
    encrypted: bool,
}

impl FileSecretsStore {
    /// Create a new store for `<config_dir>/secrets.yaml`.
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(SECRETS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether sops reports the file as encrypted. A missing sops binary means no.
    async fn is_encrypted(&self) -> bool {
        let path = self.path.to_string_lossy();
        match run_binary(Path::new(SOPS), &["filestatus", &path], None).await {
            Ok(output) => serde_json::from_slice::<SopsFileStatus>(&output)
                .map(|status| status.encrypted)
                .unwrap_or(false),
            Err(reason) => {
                debug!(reason = %reason, "sops filestatus unavailable, treating file as plaintext");
                false
            }
        }
    }

    async fn read(&self) -> Result<Vec<u8>, Error> {
        if self.is_encrypted().await {
            let path = self.path.to_string_lossy();
            return run_binary(Path::new(SOPS), &["decrypt", &path], None)
                .await
                .map_err(|e| Error::Secrets(format!("sops decryption failed: {e}")));
        }

        tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::Secrets(format!("read {}: {e}", self.path.display())))
    }

    fn write(&self, contents: &[u8]) -> Result<(), Error> {
        let write_error = |e: std::io::Error| Error::Secrets(format!("write {}: {e}", self.path.display()));

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.path)
            .map_err(write_error)?;
        // `mode` only applies on creation.
        file.set_permissions(Permissions::from_mode(0o600))
            .map_err(write_error)?;
        file.write_all(contents).map_err(write_error)?;
        file.flush().map_err(write_error)
    }
}

#[async_trait]
impl SecretsStore for FileSecretsStore {
    async fn get(&self, _cluster: &str) -> Result<Option<SecretsBundle>, Error> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }

        let contents = self.read().await?;
        let contents = String::from_utf8(contents)
            .map_err(|e| Error::Secrets(format!("{} is not UTF-8: {e}", self.path.display())))?;
        SecretsBundle::from_yaml(&contents).map(Some)
    }

    async fn put(&self, _cluster: &str, bundle: &SecretsBundle) -> Result<(), Error> {
        let plaintext = bundle.to_yaml()?;
        let path = self.path.to_string_lossy();

        let contents = match run_binary(
            Path::new(SOPS),
            &["encrypt", "--filename-override", &path],
            Some(plaintext.as_bytes()),
        )
        .await
        {
            Ok(encrypted) => encrypted,
            Err(reason) => {
                warn!(reason = %reason, path = %self.path.display(), "Storing secrets unencrypted");
                plaintext.into_bytes()
            }
        };

        self.write(&contents)
    }
}

// =============================================================================
// Binary store
// =============================================================================

/// Delegates storage to `<bin> secrets get|put <cluster>`.
pub struct BinarySecretsStore {
    binary: PathBuf,
}

impl BinarySecretsStore {
    /// Create a new store backed by `binary`.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl SecretsStore for BinarySecretsStore {
    async fn get(&self, cluster: &str) -> Result<Option<SecretsBundle>, Error> {
        let output = run_binary(&self.binary, &["secrets", "get", cluster], None)
            .await
            .map_err(|e| Error::Secrets(e.to_string()))?;
        let output = String::from_utf8(output)
            .map_err(|e| Error::Secrets(format!("secrets provider output is not UTF-8: {e}")))?;

        if output.trim().is_empty() {
            return Ok(None);
        }
        SecretsBundle::from_yaml(&output).map(Some)
    }

    async fn put(&self, cluster: &str, bundle: &SecretsBundle) -> Result<(), Error> {
        let contents = bundle.to_yaml()?;
        run_binary(
            &self.binary,
            &["secrets", "put", cluster],
            Some(contents.as_bytes()),
        )
        .await
        .map(|_| ())
        .map_err(|e| Error::Secrets(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use herd_converge::secrets::generate;

    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretsStore::new(dir.path());

        assert!(store.get("demo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_round_trip_is_private() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretsStore::new(dir.path());
        let bundle = generate("demo").unwrap();

        store.put("demo", &bundle).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // Only meaningful when sops is not installed and the file is plaintext.
        if !store.is_encrypted().await {
            let loaded = store.get("demo").await.unwrap().unwrap();
            assert_eq!(loaded.cluster.id, bundle.cluster.id);
            assert_eq!(loaded.certs.admin.crt, bundle.certs.admin.crt);
        }
    }

    #[tokio::test]
    async fn test_file_store_tightens_existing_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretsStore::new(dir.path());
        std::fs::write(store.path(), "stale: true\n").unwrap();
        std::fs::set_permissions(store.path(), Permissions::from_mode(0o644)).unwrap();

        store.put("demo", &generate("demo").unwrap()).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_run_binary_reports_failure() {
        let err = run_binary(Path::new("false"), &[], None).await.unwrap_err();
        assert!(matches!(err, CliError::ProcessFailed { .. }));
        assert!(err.to_string().contains("exited with"));
    }

    #[tokio::test]
    async fn test_run_binary_reports_missing_binary() {
        let err = run_binary(Path::new("/nonexistent/herd-provider"), &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Process { action: "run", .. }));
    }

    #[tokio::test]
    async fn test_run_binary_feeds_stdin() {
        let output = run_binary(Path::new("cat"), &[], Some(b"hello")).await.unwrap();
        assert_eq!(output, b"hello");
    }
}
