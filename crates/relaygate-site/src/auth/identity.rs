//! Transport-verified relay identity.

use std::fmt;

use super::validator::AuthError;

/// Common name of a relay as established by the transport.
///
/// Only this crate's interceptors can construct one, so handlers can trust
/// its presence in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    common_name: String,
}

impl VerifiedIdentity {
    /// Identity from the DER leaf certificate the TLS layer already verified.
    pub(crate) fn from_peer_certificate(der: &[u8]) -> Result<Self, AuthError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| AuthError::InvalidPeerCertificate(e.to_string()))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .ok_or_else(|| {
                AuthError::InvalidPeerCertificate("subject has no common name".to_string())
            })?;

        Ok(Self {
            common_name: common_name.to_string(),
        })
    }

    /// Identity asserted by a trusted TLS-terminating proxy.
    pub(crate) fn from_trusted_header(value: &str) -> Result<Self, AuthError> {
        let value = value.trim();
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(AuthError::InvalidPeerCertificate(format!(
                "unusable identity header value {value:?}"
            )));
        }
        Ok(Self {
            common_name: value.to_string(),
        })
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }
}

impl fmt::Display for VerifiedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.common_name)
    }
}
