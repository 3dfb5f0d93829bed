//! SQLite storage for the relaygate site.
//!
//! Persists the relay registry and the client certificates issued to relays.
//! Task queues are in-memory and live in [`crate::tasks`].

mod db;
mod models;
mod queries;
mod queries_certs;


pub use db::SiteDatabase;
pub use models::*;
pub use queries_certs::CertificateRecordParams;
pub use relaygate_core::db::DatabaseError;
