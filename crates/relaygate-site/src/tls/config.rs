//! Server TLS configuration with relay client-certificate verification.

use std::path::{Path, PathBuf};

use relaygate_crypto::{CaBundle, CertError, generate_server_cert};
use tonic::transport::{Certificate, Identity, ServerTlsConfig};
use tracing::info;

/// File names used for the dev server identity.
const SERVER_CERT_FILE: &str = "server.pem";
const SERVER_KEY_FILE: &str = "server-key.pem";

/// How the site terminates TLS.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// No TLS (plaintext). Development only; relay identities must then
    /// come from a trusted proxy header.
    Disabled,
    /// Server certificate signed by the relay CA, generated into `cert_dir`.
    DevSelfSigned { cert_dir: PathBuf },
    /// User-provided certificate and key files.
    Custom {
        cert_path: PathBuf,
        key_path: PathBuf,
    },
}

impl TlsMode {
    /// Build a tonic `ServerTlsConfig` that presents the site identity and
    /// verifies relay client certificates against the relay CA.
    ///
    /// Returns `None` if TLS is disabled.
    pub fn to_server_tls_config(
        &self,
        relay_ca: &CaBundle,
    ) -> Result<Option<ServerTlsConfig>, TlsConfigError> {
        let identity = match self {
            Self::Disabled => return Ok(None),
            Self::DevSelfSigned { cert_dir } => {
                let (cert_pem, key_pem) =
                    generate_server_cert(relay_ca, &["localhost", "127.0.0.1"])?;
                write_server_identity(cert_dir, &cert_pem, &key_pem)?;
                info!(cert_dir = %cert_dir.display(), "Dev TLS enabled");
                Identity::from_pem(cert_pem, key_pem)
            }
            Self::Custom {
                cert_path,
                key_path,
            } => {
                let cert_pem = read_pem(cert_path)?;
                let key_pem = read_pem(key_path)?;
                info!(
                    cert = %cert_path.display(),
                    key = %key_path.display(),
                    "Custom TLS enabled"
                );
                Identity::from_pem(cert_pem, key_pem)
            }
        };

        let tls_config = ServerTlsConfig::new()
            .identity(identity)
            .client_ca_root(Certificate::from_pem(&relay_ca.ca_cert_pem));
        Ok(Some(tls_config))
    }
}

fn read_pem(path: &Path) -> Result<String, TlsConfigError> {
    std::fs::read_to_string(path)
        .map_err(|e| TlsConfigError::FileRead(format!("Failed to read {}: {e}", path.display())))
}

fn write_server_identity(dir: &Path, cert_pem: &str, key_pem: &str) -> Result<(), TlsConfigError> {
    let write = |name: &str, content: &str| {
        std::fs::write(dir.join(name), content).map_err(|e| {
            TlsConfigError::FileWrite(format!("Failed to write {}: {e}", dir.join(name).display()))
        })
    };

    std::fs::create_dir_all(dir)
        .map_err(|e| TlsConfigError::FileWrite(format!("{}: {e}", dir.display())))?;
    write(SERVER_CERT_FILE, cert_pem)?;
    write(SERVER_KEY_FILE, key_pem)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(
            dir.join(SERVER_KEY_FILE),
            std::fs::Permissions::from_mode(0o600),
        )
        .map_err(|e| TlsConfigError::FileWrite(e.to_string()))?;
    }
    Ok(())
}

/// TLS configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum TlsConfigError {
    #[error("Certificate generation error: {0}")]
    CertGeneration(String),

    #[error("File read error: {0}")]
    FileRead(String),

    #[error("File write error: {0}")]
    FileWrite(String),
}

impl From<CertError> for TlsConfigError {
    fn from(e: CertError) -> Self {
        Self::CertGeneration(e.to_string())
    }
}
