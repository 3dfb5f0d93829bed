//! Relay request authentication.
//!
//! The transport layer turns the TLS client certificate (or, behind a
//! trusted TLS-terminating proxy, a designated header) into a
//! [`VerifiedIdentity`] request extension. [`MtlsAuthValidator`] then checks
//! that identity against the relay named by the request before any business
//! logic runs.

mod identity;
mod interceptor;
mod validator;

pub use identity::VerifiedIdentity;
pub use interceptor::{extract_identity, mtls_identity_interceptor, trusted_header_interceptor};
pub use validator::{AuthError, MtlsAuthValidator, PathParams};
