//! Issued client certificate records.

use relaygate_core::db::{DatabaseError, unix_timestamp};

use super::db::SiteDatabase;
use super::models::RelayCertificate;

/// Parameters for [`SiteDatabase::record_certificate`].
#[derive(Debug, Clone)]
pub struct CertificateRecordParams<'a> {
    pub serial_number: &'a str,
    pub relay_id: &'a str,
    pub fingerprint_sha256: &'a str,
    pub not_before: i64,
    pub not_after: i64,
    pub pem_cert: &'a str,
}

impl SiteDatabase {
    pub async fn record_certificate(
        &self,
        params: &CertificateRecordParams<'_>,
    ) -> Result<RelayCertificate, DatabaseError> {
        sqlx::query(
            "INSERT INTO relay_certificates (serial_number, relay_id, fingerprint_sha256, not_before, not_after, pem_cert, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.serial_number)
        .bind(params.relay_id)
        .bind(params.fingerprint_sha256)
        .bind(params.not_before)
        .bind(params.not_after)
        .bind(params.pem_cert)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_certificate_by_serial(params.serial_number)
            .await?
            .ok_or_else(|| {
                DatabaseError::NotFound(format!("Certificate {}", params.serial_number))
            })
    }

    pub async fn get_certificate_by_serial(
        &self,
        serial_number: &str,
    ) -> Result<Option<RelayCertificate>, DatabaseError> {
        let cert = sqlx::query_as::<_, RelayCertificate>(
            "SELECT * FROM relay_certificates WHERE serial_number = ?",
        )
        .bind(serial_number)
        .fetch_optional(self.pool())
        .await?;

        Ok(cert)
    }

    /// Certificates issued to a relay, newest first.
    pub async fn list_certificates(
        &self,
        relay_id: &str,
    ) -> Result<Vec<RelayCertificate>, DatabaseError> {
        let certs = sqlx::query_as::<_, RelayCertificate>(
            "SELECT * FROM relay_certificates WHERE relay_id = ? ORDER BY created_at DESC, serial_number",
        )
        .bind(relay_id)
        .fetch_all(self.pool())
        .await?;

        Ok(certs)
    }
}
