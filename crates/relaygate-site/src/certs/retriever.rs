//! Signs relay CSRs with the relay CA.

use relaygate_crypto::{CaBundle, CertError, add_months, csr_common_name, sign_client_csr};
use time::OffsetDateTime;
use tracing::info;

/// Hard ceiling on the lifetime of an issued client certificate.
pub const MAX_VALIDITY_MONTHS: u8 = 3;

/// Certificate material returned to a registering relay.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub client_cert_pem: String,
    pub ca_cert_pem: String,
    /// Unix timestamp.
    pub not_valid_before: i64,
    /// Unix timestamp.
    pub not_valid_after: i64,
    pub serial_hex: String,
    pub fingerprint_sha256: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CertRetrievalError {
    #[error("CSR common name {csr_cn:?} does not match relay id {relay_id:?}")]
    CertificateCn { csr_cn: String, relay_id: String },

    #[error("Invalid CSR: {0}")]
    InvalidCsr(String),

    #[error("Requested validity end {requested} is not in the future")]
    InvalidValidity { requested: OffsetDateTime },

    #[error("Certificate signing failed: {0}")]
    Signing(String),
}

impl From<CertError> for CertRetrievalError {
    fn from(e: CertError) -> Self {
        match e {
            CertError::InvalidCsr(msg) => Self::InvalidCsr(msg),
            other => Self::Signing(other.to_string()),
        }
    }
}

/// Issues short-lived client certificates bound to a relay id.
pub struct CertRetriever {
    ca: CaBundle,
}

impl std::fmt::Debug for CertRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertRetriever").finish_non_exhaustive()
    }
}

impl CertRetriever {
    pub const fn new(ca: CaBundle) -> Self {
        Self { ca }
    }

    pub const fn ca(&self) -> &CaBundle {
        &self.ca
    }

    pub fn ca_cert_pem(&self) -> &str {
        &self.ca.ca_cert_pem
    }

    /// Sign `csr_pem` for `relay_id`.
    ///
    /// The CSR subject CN must equal `relay_id`. The certificate is valid from
    /// now until `min(now + 3 months, requested_not_after)`.
    pub fn get_certificates(
        &self,
        csr_pem: &str,
        relay_id: &str,
        requested_not_after: Option<OffsetDateTime>,
    ) -> Result<IssuedCertificate, CertRetrievalError> {
        let csr_cn = csr_common_name(csr_pem)?;
        if csr_cn != relay_id {
            return Err(CertRetrievalError::CertificateCn {
                csr_cn,
                relay_id: relay_id.to_string(),
            });
        }

        let now = OffsetDateTime::from_unix_timestamp(OffsetDateTime::now_utc().unix_timestamp())
            .map_err(|e| CertRetrievalError::Signing(e.to_string()))?;
        let ceiling = add_months(now, MAX_VALIDITY_MONTHS);
        let not_after = match requested_not_after {
            Some(requested) if requested <= now => {
                return Err(CertRetrievalError::InvalidValidity { requested });
            }
            Some(requested) => requested.min(ceiling),
            None => ceiling,
        };

        let signed = sign_client_csr(&self.ca, csr_pem, relay_id, now, not_after, next_serial())?;

        info!(
            relay_id = %relay_id,
            serial = %signed.serial_hex,
            not_after = signed.not_after,
            "Issued relay client certificate"
        );

        Ok(IssuedCertificate {
            client_cert_pem: signed.cert_pem,
            ca_cert_pem: self.ca.ca_cert_pem.clone(),
            not_valid_before: signed.not_before,
            not_valid_after: signed.not_after,
            serial_hex: signed.serial_hex,
            fingerprint_sha256: signed.fingerprint_sha256,
        })
    }
}

/// Random positive 63-bit serial.
fn next_serial() -> u64 {
    let (high, _) = uuid::Uuid::new_v4().as_u64_pair();
    (high & 0x7fff_ffff_ffff_ffff).max(1)
}
