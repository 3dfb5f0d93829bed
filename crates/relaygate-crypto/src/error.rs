//! Certificate error types.

/// Errors from certificate parsing, generation and signing.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// Key or certificate generation/signing failed.
    #[error("Certificate generation error: {0}")]
    Generation(String),

    /// The CSR could not be decoded, or its self-signature is invalid.
    #[error("Invalid certificate signing request: {0}")]
    InvalidCsr(String),

    /// A PEM certificate could not be decoded.
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
