//! Per-route check that the caller is the relay it claims to be.

use tonic::Request;

use super::identity::VerifiedIdentity;
use super::interceptor::extract_identity;

/// Request messages that carry path-like identity fields.
pub trait PathParams {
    fn path_param(&self, field: &str) -> Option<&str>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Request carries no verified relay identity")]
    MissingIdentity,

    #[error("Request has no {0} field to authorize against")]
    MissingPathField(String),

    #[error("Verified identity '{verified}' does not match {field} '{claimed}'")]
    Mismatch {
        verified: String,
        claimed: String,
        field: String,
    },

    #[error("Invalid peer certificate: {0}")]
    InvalidPeerCertificate(String),
}

/// Compares the transport-verified identity with a named request field.
#[derive(Debug, Clone, Copy)]
pub struct MtlsAuthValidator {
    path_field: &'static str,
}

impl MtlsAuthValidator {
    pub const fn new(path_field: &'static str) -> Self {
        Self { path_field }
    }

    pub const fn path_field(&self) -> &'static str {
        self.path_field
    }

    pub fn check(&self, verified: &VerifiedIdentity, claimed: &str) -> Result<(), AuthError> {
        if verified.common_name() == claimed {
            Ok(())
        } else {
            Err(AuthError::Mismatch {
                verified: verified.common_name().to_string(),
                claimed: claimed.to_string(),
                field: self.path_field.to_string(),
            })
        }
    }

    /// Authorize `req`, returning the identity on success.
    pub fn validate<'a, T: PathParams>(
        &self,
        req: &'a Request<T>,
    ) -> Result<&'a VerifiedIdentity, AuthError> {
        let verified = extract_identity(req).ok_or(AuthError::MissingIdentity)?;
        let claimed = req
            .get_ref()
            .path_param(self.path_field)
            .ok_or_else(|| AuthError::MissingPathField(self.path_field.to_string()))?;

        self.check(verified, claimed)?;
        Ok(verified)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Uuid(&'static str);

    impl PathParams for Uuid {
        fn path_param(&self, field: &str) -> Option<&str> {
            (field == "uuid").then_some(self.0)
        }
    }

    fn identity(cn: &str) -> VerifiedIdentity {
        VerifiedIdentity::from_trusted_header(cn).unwrap()
    }

    fn request(claimed: &'static str, verified: Option<&str>) -> Request<Uuid> {
        let mut req = Request::new(Uuid(claimed));
        if let Some(cn) = verified {
            req.extensions_mut().insert(identity(cn));
        }
        req
    }

    #[test]
    fn equal_identities_pass() {
        let validator = MtlsAuthValidator::new("uuid");
        assert!(validator.check(&identity("uuid-A"), "uuid-A").is_ok());

        let req = request("uuid-A", Some("uuid-A"));
        assert_eq!(validator.validate(&req).unwrap().common_name(), "uuid-A");
    }

    #[test]
    fn mismatch_names_both_values() {
        let validator = MtlsAuthValidator::new("uuid");
        let err = validator.validate(&request("uuid-B", Some("uuid-A"))).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("uuid-A"), "{message}");
        assert!(message.contains("uuid-B"), "{message}");
        assert!(matches!(err, AuthError::Mismatch { .. }));
    }

    #[test]
    fn missing_identity_is_rejected() {
        let validator = MtlsAuthValidator::new("uuid");
        assert!(matches!(
            validator.validate(&request("uuid-A", None)),
            Err(AuthError::MissingIdentity)
        ));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let validator = MtlsAuthValidator::new("relay_id");
        assert!(matches!(
            validator.validate(&request("uuid-A", Some("uuid-A"))),
            Err(AuthError::MissingPathField(field)) if field == "relay_id"
        ));
    }
}
