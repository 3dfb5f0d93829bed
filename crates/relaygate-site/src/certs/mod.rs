//! Client certificate issuance for relays.

mod retriever;

pub use retriever::{CertRetrievalError, CertRetriever, IssuedCertificate, MAX_VALIDITY_MONTHS};
