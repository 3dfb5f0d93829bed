//! Relay registration: registry entry plus a freshly signed client
//! certificate, or neither.

use time::OffsetDateTime;
use tracing::{error, warn};

use super::repository::{RelayRepoError, RelaysRepository};
use crate::certs::{CertRetrievalError, CertRetriever, IssuedCertificate};
use crate::storage::{CertificateRecordParams, Relay};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Relay(#[from] RelayRepoError),

    #[error(transparent)]
    Certificate(#[from] CertRetrievalError),
}

#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub relay: Relay,
    pub certificate: IssuedCertificate,
}

/// Add `relay_id` to the registry and issue its client certificate.
///
/// If issuance or recording the certificate fails, the relay is removed
/// again before the error is returned.
pub async fn register_relay(
    relays: &RelaysRepository,
    certs: &CertRetriever,
    relay_id: &str,
    alias: &str,
    csr_pem: &str,
    requested_not_after: Option<OffsetDateTime>,
) -> Result<RegistrationOutcome, RegistrationError> {
    let relay = relays.add_relay(Some(relay_id), alias).await?;

    let certificate = match certs.get_certificates(csr_pem, &relay.id, requested_not_after) {
        Ok(certificate) => certificate,
        Err(e) => {
            warn!(relay_id = %relay.id, error = %e, "Certificate issuance failed, rolling back registration");
            rollback(relays, &relay.id).await;
            return Err(e.into());
        }
    };

    if let Err(e) = record(relays, &relay.id, &certificate).await {
        warn!(relay_id = %relay.id, error = %e, "Recording certificate failed, rolling back registration");
        rollback(relays, &relay.id).await;
        return Err(e.into());
    }

    Ok(RegistrationOutcome { relay, certificate })
}

/// Issue a fresh certificate for an already registered relay.
pub async fn renew_certificate(
    relays: &RelaysRepository,
    certs: &CertRetriever,
    relay_id: &str,
    csr_pem: &str,
    requested_not_after: Option<OffsetDateTime>,
) -> Result<IssuedCertificate, RegistrationError> {
    if !relays.exists(relay_id).await? {
        return Err(RelayRepoError::NotFound(relay_id.to_string()).into());
    }

    let certificate = certs.get_certificates(csr_pem, relay_id, requested_not_after)?;
    record(relays, relay_id, &certificate).await?;
    Ok(certificate)
}

async fn record(
    relays: &RelaysRepository,
    relay_id: &str,
    certificate: &IssuedCertificate,
) -> Result<(), RelayRepoError> {
    let params = CertificateRecordParams {
        serial_number: &certificate.serial_hex,
        relay_id,
        fingerprint_sha256: &certificate.fingerprint_sha256,
        not_before: certificate.not_valid_before,
        not_after: certificate.not_valid_after,
        pem_cert: &certificate.client_cert_pem,
    };
    relays.database().record_certificate(&params).await?;
    Ok(())
}

async fn rollback(relays: &RelaysRepository, relay_id: &str) {
    if let Err(e) = relays.remove_relay(relay_id).await {
        error!(relay_id = %relay_id, error = %e, "Failed to roll back relay registration");
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::SiteDatabase;
    use crate::tasks::{SystemClock, TaskLimits, TasksRepository};
    use relaygate_crypto::{generate_ca, generate_csr};

    async fn setup() -> (RelaysRepository, CertRetriever) {
        let db = SiteDatabase::open_in_memory().await.unwrap();
        let limits = TaskLimits {
            ttl_secs: 120,
            max_tasks_per_relay: 10,
            completed_retention_secs: 120,
        };
        let tasks = Arc::new(TasksRepository::new(db.clone(), limits, Arc::new(SystemClock)).unwrap());
        let certs = CertRetriever::new(generate_ca("Test Site").unwrap());
        (RelaysRepository::new(db, tasks), certs)
    }

    #[tokio::test]
    async fn registration_records_certificate() {
        let (relays, certs) = setup().await;
        let (csr, _key) = generate_csr("r1").unwrap();

        let outcome = register_relay(&relays, &certs, "r1", "Relay One", &csr, None)
            .await
            .unwrap();

        assert_eq!(outcome.relay.alias, "Relay One");
        let records = relays.database().list_certificates("r1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].serial_number, outcome.certificate.serial_hex);
        assert_eq!(records[0].pem_cert, outcome.certificate.client_cert_pem);
    }

    #[tokio::test]
    async fn cn_mismatch_rolls_back_relay() {
        let (relays, certs) = setup().await;
        let (csr, _key) = generate_csr("someone-else").unwrap();

        let err = register_relay(&relays, &certs, "r1", "Relay One", &csr, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistrationError::Certificate(CertRetrievalError::CertificateCn { .. })
        ));
        assert!(!relays.exists("r1").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_existing_relay() {
        let (relays, certs) = setup().await;
        let (csr, _key) = generate_csr("r1").unwrap();
        register_relay(&relays, &certs, "r1", "first", &csr, None)
            .await
            .unwrap();

        let err = register_relay(&relays, &certs, "r1", "second", &csr, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RegistrationError::Relay(RelayRepoError::DuplicateRelay(_))
        ));
        assert_eq!(relays.get_relay("r1").await.unwrap().alias, "first");
    }

    #[tokio::test]
    async fn renewal_adds_a_second_record() {
        let (relays, certs) = setup().await;
        let (csr, _key) = generate_csr("r1").unwrap();
        let first = register_relay(&relays, &certs, "r1", "Relay One", &csr, None)
            .await
            .unwrap();

        let renewed = renew_certificate(&relays, &certs, "r1", &csr, None)
            .await
            .unwrap();

        assert_ne!(renewed.serial_hex, first.certificate.serial_hex);
        assert_eq!(relays.database().list_certificates("r1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn renewal_for_unknown_relay_is_not_found() {
        let (relays, certs) = setup().await;
        let (csr, _key) = generate_csr("ghost").unwrap();

        let err = renew_certificate(&relays, &certs, "ghost", &csr, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::Relay(RelayRepoError::NotFound(_))
        ));
    }
}
