//! Mapping of component errors onto gRPC status codes.

use tonic::Status;
use tracing::error;

use crate::auth::AuthError;
use crate::certs::CertRetrievalError;
use crate::forward::ForwardError;
use crate::relays::{RegistrationError, RelayRepoError};
use crate::tasks::TaskError;
use relaygate_core::db::DatabaseError;

fn storage_status(e: &DatabaseError) -> Status {
    error!(error = %e, "Storage failure while serving request");
    Status::internal("Internal storage error")
}

pub fn relay_error_to_status(e: RelayRepoError) -> Status {
    match e {
        RelayRepoError::DuplicateRelay(_) => Status::already_exists(e.to_string()),
        RelayRepoError::NotFound(_) => Status::not_found(e.to_string()),
        RelayRepoError::InvalidRelayId { .. } => Status::invalid_argument(e.to_string()),
        RelayRepoError::Storage(ref db) => storage_status(db),
    }
}

pub fn task_error_to_status(e: TaskError) -> Status {
    match e {
        TaskError::RelayNotFound(_) | TaskError::TaskNotFound { .. } => {
            Status::not_found(e.to_string())
        }
        TaskError::QueueFull { .. } => Status::resource_exhausted(e.to_string()),
        TaskError::NotPending { .. } | TaskError::Configuration(_) => {
            Status::failed_precondition(e.to_string())
        }
        TaskError::Storage(ref db) => storage_status(db),
    }
}

pub fn cert_error_to_status(e: CertRetrievalError) -> Status {
    match e {
        CertRetrievalError::CertificateCn { .. } => Status::permission_denied(e.to_string()),
        CertRetrievalError::InvalidCsr(_) | CertRetrievalError::InvalidValidity { .. } => {
            Status::invalid_argument(e.to_string())
        }
        CertRetrievalError::Signing(_) => {
            error!(error = %e, "Certificate signing failed");
            Status::internal("Certificate signing failed")
        }
    }
}

pub fn registration_error_to_status(e: RegistrationError) -> Status {
    match e {
        RegistrationError::Relay(e) => relay_error_to_status(e),
        RegistrationError::Certificate(e) => cert_error_to_status(e),
    }
}

pub fn auth_error_to_status(e: AuthError) -> Status {
    match e {
        AuthError::MissingIdentity | AuthError::InvalidPeerCertificate(_) => {
            Status::unauthenticated(e.to_string())
        }
        AuthError::Mismatch { .. } => Status::permission_denied(e.to_string()),
        AuthError::MissingPathField(_) => Status::invalid_argument(e.to_string()),
    }
}

pub fn forward_error_to_status(e: ForwardError) -> Status {
    match e {
        ForwardError::InvalidEnvelope(_) => Status::invalid_argument(e.to_string()),
        ForwardError::FailedToSendMonitoringData { .. } => Status::unavailable(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn each_error_kind_has_a_distinct_code() {
        assert_eq!(
            relay_error_to_status(RelayRepoError::DuplicateRelay("r1".into())).code(),
            Code::AlreadyExists
        );
        assert_eq!(
            relay_error_to_status(RelayRepoError::NotFound("r1".into())).code(),
            Code::NotFound
        );
        assert_eq!(
            task_error_to_status(TaskError::QueueFull {
                relay_id: "r1".into(),
                limit: 10
            })
            .code(),
            Code::ResourceExhausted
        );
        assert_eq!(
            cert_error_to_status(CertRetrievalError::CertificateCn {
                csr_cn: "a".into(),
                relay_id: "b".into()
            })
            .code(),
            Code::PermissionDenied
        );
        assert_eq!(
            auth_error_to_status(AuthError::MissingIdentity).code(),
            Code::Unauthenticated
        );
        assert_eq!(
            forward_error_to_status(ForwardError::FailedToSendMonitoringData {
                socket: "/s".into(),
                reason: "refused".into()
            })
            .code(),
            Code::Unavailable
        );
        assert_eq!(
            task_error_to_status(TaskError::Configuration("ttl".into())).code(),
            Code::FailedPrecondition
        );
    }

    #[test]
    fn mismatch_status_keeps_both_identities() {
        let status = auth_error_to_status(AuthError::Mismatch {
            verified: "uuid-A".into(),
            claimed: "uuid-B".into(),
            field: "relay_id".into(),
        });
        assert_eq!(status.code(), Code::PermissionDenied);
        assert!(status.message().contains("uuid-A"));
        assert!(status.message().contains("uuid-B"));
    }

    #[test]
    fn storage_details_are_not_leaked() {
        let status = relay_error_to_status(RelayRepoError::Storage(DatabaseError::Query(
            "no such table: relays".into(),
        )));
        assert_eq!(status.code(), Code::Internal);
        assert!(!status.message().contains("relays"));
    }
}
