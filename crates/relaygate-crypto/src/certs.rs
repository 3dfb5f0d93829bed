//! Relay CA and client certificate handling.
//!
//! The site runs an internal CA whose only job is to sign relay client
//! certificates. Relays generate their own key pair and submit a CSR; the
//! private key never leaves the relay. The CN of the issued certificate is the
//! relay identity that mutual TLS later reports back to the site.

use std::path::Path;

use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SerialNumber,
};
use sha2::{Digest, Sha256};
use time::{Date, OffsetDateTime};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::pem::{Pem, parse_x509_pem};
use x509_parser::prelude::FromDer;

use crate::error::CertError;

/// File name of the CA certificate inside a CA directory.
pub const CA_CERT_FILE: &str = "ca.pem";
/// File name of the CA private key inside a CA directory.
pub const CA_KEY_FILE: &str = "ca-key.pem";

/// CA material for signing relay client certificates.
#[derive(Debug)]
pub struct CaBundle {
    /// Issuer view of the CA (subject, key identifier, signing key).
    pub issuer: Issuer<'static, KeyPair>,
    /// PEM-encoded CA certificate.
    pub ca_cert_pem: String,
}

impl CaBundle {
    /// Rebuild a CA from its PEM certificate and private key.
    pub fn from_pem(ca_cert_pem: &str, ca_key_pem: &str) -> Result<Self, CertError> {
        let key_pair =
            KeyPair::from_pem(ca_key_pem).map_err(|e| CertError::Generation(e.to_string()))?;
        let issuer = Issuer::from_ca_cert_pem(ca_cert_pem, key_pair)
            .map_err(|e| CertError::InvalidCertificate(e.to_string()))?;
        Ok(Self {
            issuer,
            ca_cert_pem: ca_cert_pem.to_string(),
        })
    }

    /// Load `ca.pem` and `ca-key.pem` from `dir`.
    ///
    /// On Unix the key file must be owner-only (0600).
    pub fn load_from_dir(dir: &Path) -> Result<Self, CertError> {
        let key_path = dir.join(CA_KEY_FILE);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&key_path)?.permissions().mode() & 0o777;
            if mode != 0o600 {
                return Err(CertError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("CA key file has insecure permissions: {mode:o} (expected 600)"),
                )));
            }
        }

        let cert_pem = std::fs::read_to_string(dir.join(CA_CERT_FILE))?;
        let key_pem = std::fs::read_to_string(&key_path)?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Write the CA certificate and key to `dir`, key with 0600 permissions.
    pub fn write_to_dir(&self, dir: &Path) -> Result<(), CertError> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(CA_CERT_FILE), &self.ca_cert_pem)?;

        let key_path = dir.join(CA_KEY_FILE);
        std::fs::write(&key_path, self.issuer.key().serialize_pem())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

/// A freshly signed certificate together with the facts worth recording.
#[derive(Debug, Clone)]
pub struct SignedCertificate {
    pub cert_pem: String,
    /// Hex-encoded DER serial number.
    pub serial_hex: String,
    /// Hex-encoded SHA-256 of the DER certificate.
    pub fingerprint_sha256: String,
    /// Unix timestamp.
    pub not_before: i64,
    /// Unix timestamp.
    pub not_after: i64,
}

/// Parsed view of a PEM certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub common_name: Option<String>,
    pub issuer_common_name: Option<String>,
    pub serial_hex: String,
    pub not_before: i64,
    pub not_after: i64,
    pub client_auth: bool,
}

/// Generate a self-signed CA suitable for signing relay client certificates.
pub fn generate_ca(org_name: &str) -> Result<CaBundle, CertError> {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, format!("{org_name} Relay CA"));
    dn.push(DnType::OrganizationName, org_name);
    params.distinguished_name = dn;
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

    let key_pair = KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
    let ca_cert = params
        .self_signed(&key_pair)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    Ok(CaBundle {
        ca_cert_pem: ca_cert.pem(),
        issuer: Issuer::new(params, key_pair),
    })
}

/// Generate a key pair and a CSR for `common_name`.
///
/// Returns `(csr_pem, key_pem)`. This is what a relay does before
/// registering.
pub fn generate_csr(common_name: &str) -> Result<(String, String), CertError> {
    let key_pair = KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;

    let csr = params
        .serialize_request(&key_pair)
        .map_err(|e| CertError::Generation(e.to_string()))?;
    let csr_pem = csr
        .pem()
        .map_err(|e| CertError::Generation(e.to_string()))?;
    Ok((csr_pem, key_pair.serialize_pem()))
}

/// Extract the single subject common name of a PEM-encoded CSR.
///
/// A CSR without a CN, or with more than one, is rejected.
pub fn csr_common_name(csr_pem: &str) -> Result<String, CertError> {
    let pem = decode_pem(csr_pem, CertError::InvalidCsr)?;
    if !pem.label.ends_with("CERTIFICATE REQUEST") {
        return Err(CertError::InvalidCsr(format!(
            "expected a CERTIFICATE REQUEST block, found {}",
            pem.label
        )));
    }

    let (_, csr) = X509CertificationRequest::from_der(&pem.contents)
        .map_err(|e| CertError::InvalidCsr(e.to_string()))?;

    let mut names = csr.certification_request_info.subject.iter_common_name();
    let cn = names
        .next()
        .ok_or_else(|| CertError::InvalidCsr("subject has no common name".to_string()))?;
    if names.next().is_some() {
        return Err(CertError::InvalidCsr(
            "subject has more than one common name".to_string(),
        ));
    }
    cn.as_str()
        .map(ToString::to_string)
        .map_err(|e| CertError::InvalidCsr(e.to_string()))
}

/// Sign a relay CSR with the CA.
///
/// Only the CSR's public key is taken over. The subject is exactly
/// `common_name` and the sole extended key usage is `clientAuth`; SANs, CA
/// flags or other extensions requested in the CSR are ignored.
pub fn sign_client_csr(
    ca: &CaBundle,
    csr_pem: &str,
    common_name: &str,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
    serial: u64,
) -> Result<SignedCertificate, CertError> {
    let csr = CertificateSigningRequestParams::from_pem(csr_pem)
        .map_err(|e| CertError::InvalidCsr(e.to_string()))?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    params.use_authority_key_identifier_extension = true;
    params.not_before = not_before;
    params.not_after = not_after;
    params.serial_number = Some(SerialNumber::from(serial));

    let cert = params
        .signed_by(&csr.public_key, &ca.issuer)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    let cert_pem = cert.pem();
    let info = inspect_certificate(&cert_pem)?;
    Ok(SignedCertificate {
        fingerprint_sha256: hex::encode(Sha256::digest(cert.der())),
        serial_hex: info.serial_hex,
        not_before: info.not_before,
        not_after: info.not_after,
        cert_pem,
    })
}

/// Generate a server certificate for `server_names` signed by the CA.
///
/// Returns `(cert_pem, key_pem)`. Intended for development setups where the
/// site endpoints share the relay CA.
pub fn generate_server_cert(
    ca: &CaBundle,
    server_names: &[&str],
) -> Result<(String, String), CertError> {
    let mut params = CertificateParams::new(
        server_names
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
    )
    .map_err(|e| CertError::Generation(e.to_string()))?;
    params
        .distinguished_name
        .push(DnType::CommonName, "relaygate site");
    params
        .extended_key_usages
        .push(ExtendedKeyUsagePurpose::ServerAuth);

    let server_key = KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
    let server_cert = params
        .signed_by(&server_key, &ca.issuer)
        .map_err(|e| CertError::Generation(e.to_string()))?;

    Ok((server_cert.pem(), server_key.serialize_pem()))
}

/// Decode a PEM certificate into the fields the site cares about.
pub fn inspect_certificate(cert_pem: &str) -> Result<CertificateInfo, CertError> {
    let pem = decode_pem(cert_pem, CertError::InvalidCertificate)?;
    let cert = pem
        .parse_x509()
        .map_err(|e| CertError::InvalidCertificate(e.to_string()))?;

    let first_cn = |name: &x509_parser::x509::X509Name<'_>| {
        name.iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(ToString::to_string)
    };

    let client_auth = cert
        .extended_key_usage()
        .ok()
        .flatten()
        .is_some_and(|eku| eku.value.client_auth);

    Ok(CertificateInfo {
        common_name: first_cn(cert.subject()),
        issuer_common_name: first_cn(cert.issuer()),
        serial_hex: hex::encode(cert.raw_serial()),
        not_before: cert.validity().not_before.timestamp(),
        not_after: cert.validity().not_after.timestamp(),
        client_auth,
    })
}

/// Add calendar months, clamping the day to the target month's length
/// (Nov 30 + 3 months = Feb 28/29).
pub fn add_months(at: OffsetDateTime, months: u8) -> OffsetDateTime {
    let zero_based = u32::from(u8::from(at.month()) - 1) + u32::from(months);
    let year = at.year() + i32::try_from(zero_based / 12).unwrap_or(0);
    let month = at.month().nth_next(months);
    let day = at.day().min(month.length(year));

    Date::from_calendar_date(year, month, day).map_or_else(
        |_| at + time::Duration::days(i64::from(months) * 28),
        |date| at.replace_date(date),
    )
}

fn decode_pem(input: &str, err: fn(String) -> CertError) -> Result<Pem, CertError> {
    let (_, pem) = parse_x509_pem(input.as_bytes()).map_err(|e| err(e.to_string()))?;
    Ok(pem)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::needless_pass_by_value
)]
mod tests {
    use super::*;
    use time::Month;

    fn at(year: i32, month: Month, day: u8) -> OffsetDateTime {
        Date::from_calendar_date(year, month, day)
            .unwrap()
            .with_hms(12, 0, 0)
            .unwrap()
            .assume_utc()
    }

    fn now_secs() -> OffsetDateTime {
        OffsetDateTime::now_utc().replace_nanosecond(0).unwrap()
    }

    /// Rewrite one base64 digit of the final quartet so a trailing byte of
    /// the signature changes while the DER stays well formed.
    fn tamper_signature(csr_pem: &str) -> String {
        let mut lines: Vec<String> = csr_pem.lines().map(ToString::to_string).collect();
        let end = lines
            .iter()
            .position(|line| line.starts_with("-----END"))
            .unwrap();
        let last = &mut lines[end - 1];
        let idx = last.len() - 4;
        let replacement = if last.as_bytes()[idx] == b'A' { "B" } else { "A" };
        last.replace_range(idx..=idx, replacement);
        lines.join("\n")
    }

    #[test]
    fn generate_ca_produces_valid_pem() {
        let ca = generate_ca("relaygate Test").unwrap();
        assert!(ca.ca_cert_pem.contains("BEGIN CERTIFICATE"));
        let info = inspect_certificate(&ca.ca_cert_pem).unwrap();
        assert_eq!(info.common_name.as_deref(), Some("relaygate Test Relay CA"));
    }

    #[test]
    fn csr_common_name_roundtrips() {
        let (csr, key) = generate_csr("relay-42").unwrap();
        assert!(csr.contains("BEGIN CERTIFICATE REQUEST"));
        assert!(key.contains("BEGIN PRIVATE KEY"));
        assert_eq!(csr_common_name(&csr).unwrap(), "relay-42");
    }

    #[test]
    fn garbage_csr_is_rejected() {
        assert!(matches!(
            csr_common_name("not a pem"),
            Err(CertError::InvalidCsr(_))
        ));
    }

    #[test]
    fn certificate_pem_is_not_a_csr() {
        let ca = generate_ca("relaygate Test").unwrap();
        assert!(matches!(
            csr_common_name(&ca.ca_cert_pem),
            Err(CertError::InvalidCsr(_))
        ));
    }

    #[test]
    fn signed_client_cert_carries_cn_and_validity() {
        let ca = generate_ca("relaygate Test").unwrap();
        let (csr, _key) = generate_csr("relay-7").unwrap();
        let not_before = now_secs();
        let not_after = add_months(not_before, 3);

        let signed = sign_client_csr(&ca, &csr, "relay-7", not_before, not_after, 77).unwrap();
        let info = inspect_certificate(&signed.cert_pem).unwrap();

        assert_eq!(info.common_name.as_deref(), Some("relay-7"));
        assert_eq!(info.issuer_common_name.as_deref(), Some("relaygate Test Relay CA"));
        assert_eq!(info.not_before, not_before.unix_timestamp());
        assert_eq!(info.not_after, not_after.unix_timestamp());
        assert!(info.client_auth);
        assert_eq!(signed.serial_hex, info.serial_hex);
        assert_eq!(signed.fingerprint_sha256.len(), 64);
    }

    #[test]
    fn tampered_csr_signature_is_rejected() {
        let ca = generate_ca("relaygate Test").unwrap();
        let (csr, _key) = generate_csr("relay-7").unwrap();
        let tampered = tamper_signature(&csr);
        assert_ne!(tampered, csr);

        // Subject still parses; only the self-signature is broken.
        assert_eq!(csr_common_name(&tampered).unwrap(), "relay-7");

        let now = now_secs();
        let err = sign_client_csr(&ca, &tampered, "relay-7", now, add_months(now, 1), 5)
            .unwrap_err();
        assert!(matches!(err, CertError::InvalidCsr(_)));
    }

    #[test]
    fn distinct_serials_for_distinct_signings() {
        let ca = generate_ca("relaygate Test").unwrap();
        let (csr, _) = generate_csr("relay-a").unwrap();
        let now = now_secs();
        let a = sign_client_csr(&ca, &csr, "relay-a", now, add_months(now, 1), 1).unwrap();
        let b = sign_client_csr(&ca, &csr, "relay-a", now, add_months(now, 1), 2).unwrap();
        assert_ne!(a.serial_hex, b.serial_hex);
        assert_ne!(a.fingerprint_sha256, b.fingerprint_sha256);
    }

    #[test]
    fn server_cert_signed_by_ca() {
        let ca = generate_ca("relaygate Test").unwrap();
        let (cert_pem, key_pem) = generate_server_cert(&ca, &["localhost"]).unwrap();
        assert!(cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(key_pem.contains("BEGIN PRIVATE KEY"));
    }

    #[test]
    fn ca_survives_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let ca = generate_ca("relaygate Test").unwrap();
        ca.write_to_dir(dir.path()).unwrap();

        let loaded = CaBundle::load_from_dir(dir.path()).unwrap();
        assert_eq!(loaded.ca_cert_pem, ca.ca_cert_pem);

        let (csr, _) = generate_csr("relay-1").unwrap();
        let now = now_secs();
        let signed = sign_client_csr(&loaded, &csr, "relay-1", now, add_months(now, 1), 9).unwrap();
        let info = inspect_certificate(&signed.cert_pem).unwrap();
        assert_eq!(info.issuer_common_name.as_deref(), Some("relaygate Test Relay CA"));
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_ca_key_is_refused() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        generate_ca("relaygate Test")
            .unwrap()
            .write_to_dir(dir.path())
            .unwrap();
        std::fs::set_permissions(
            dir.path().join(CA_KEY_FILE),
            std::fs::Permissions::from_mode(0o644),
        )
        .unwrap();

        assert!(matches!(
            CaBundle::load_from_dir(dir.path()),
            Err(CertError::Io(_))
        ));
    }

    #[test]
    fn add_months_clamps_day() {
        assert_eq!(
            add_months(at(2026, Month::November, 30), 3),
            at(2027, Month::February, 28)
        );
        assert_eq!(
            add_months(at(2027, Month::November, 30), 3),
            at(2028, Month::February, 29)
        );
        assert_eq!(
            add_months(at(2026, Month::January, 15), 3),
            at(2026, Month::April, 15)
        );
        assert_eq!(
            add_months(at(2026, Month::October, 31), 3),
            at(2027, Month::January, 31)
        );
    }
}
