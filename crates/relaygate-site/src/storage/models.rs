//! Row models for site storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Relay {
    pub id: String,
    pub alias: String,
    pub registered_at: i64,
    /// Last time the relay polled for tasks.
    pub last_seen: i64,
}

/// A client certificate issued to a relay.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RelayCertificate {
    pub serial_number: String,
    pub relay_id: String,
    pub fingerprint_sha256: String,
    pub not_before: i64,
    pub not_after: i64,
    pub pem_cert: String,
    pub created_at: i64,
}
