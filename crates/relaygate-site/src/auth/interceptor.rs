//! Interceptors that attach a [`VerifiedIdentity`] to incoming requests.

use tonic::{Request, Status};
use tracing::warn;

use super::identity::VerifiedIdentity;

/// Attach the identity of the TLS client certificate, if the peer sent one.
///
/// Requests without a client certificate pass through unchanged; gated
/// handlers reject them when they look for the identity.
pub fn mtls_identity_interceptor() -> impl Fn(Request<()>) -> Result<Request<()>, Status> + Clone
{
    move |mut req: Request<()>| {
        let leaf = req
            .peer_certs()
            .and_then(|certs| certs.first().map(|cert| cert.to_vec()));

        if let Some(der) = leaf {
            let identity = VerifiedIdentity::from_peer_certificate(&der).map_err(|e| {
                warn!(error = %e, "Rejecting request with unusable client certificate");
                Status::unauthenticated(e.to_string())
            })?;
            req.extensions_mut().insert(identity);
        }
        Ok(req)
    }
}

/// Attach the identity a trusted TLS-terminating proxy put in `header`.
///
/// The header is removed from the metadata so handlers never see it.
pub fn trusted_header_interceptor(
    header: &'static str,
) -> impl Fn(Request<()>) -> Result<Request<()>, Status> + Clone {
    move |mut req: Request<()>| {
        let Some(value) = req.metadata_mut().remove(header) else {
            return Ok(req);
        };

        let value = value
            .to_str()
            .map_err(|_| Status::unauthenticated(format!("{header} header is not ASCII")))?;
        let identity = VerifiedIdentity::from_trusted_header(value)
            .map_err(|e| Status::unauthenticated(e.to_string()))?;

        req.extensions_mut().insert(identity);
        Ok(req)
    }
}

/// Identity attached by one of the interceptors, if any.
pub fn extract_identity<T>(req: &Request<T>) -> Option<&VerifiedIdentity> {
    req.extensions().get::<VerifiedIdentity>()
}
