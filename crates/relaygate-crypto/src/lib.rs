//! relaygate certificate library
//!
//! Certificate primitives for the relay control plane:
//!
//! - **Relay CA**: generation, PEM persistence and loading
//! - **CSR inspection**: subject common name extraction
//! - **Client certificates**: signing relay CSRs with explicit validity bounds
//! - **Server certificates**: dev TLS identities for the site endpoints

pub mod certs;
pub mod error;

pub use certs::{
    CaBundle, CertificateInfo, SignedCertificate, add_months, csr_common_name, generate_ca,
    generate_csr, generate_server_cert, inspect_certificate, sign_client_csr,
};
pub use error::CertError;
