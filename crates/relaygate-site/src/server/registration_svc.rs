//! Relay registration endpoints.
//!
//! Only `renew` is gated on the caller's relay identity. `register`,
//! `unregister` and `list_relays` are site-admin routes: they check no caller
//! identity, so the embedding router must not expose them on the relay-facing
//! mTLS listener without its own admin authentication in front.

use std::sync::Arc;

use time::OffsetDateTime;
use tonic::{Request, Response, Status};
use tracing::{info, instrument};

use super::messages::{
    ListRelaysRequest, ListRelaysResponse, RegisterRelayRequest, RelayCertificateResponse,
    RelayInfo, RenewCertificateRequest, UnregisterRelayRequest, UnregisterRelayResponse,
};
use super::status::{auth_error_to_status, registration_error_to_status, relay_error_to_status};
use crate::auth::MtlsAuthValidator;
use crate::certs::{CertRetriever, IssuedCertificate};
use crate::relays::{RelaysRepository, register_relay, renew_certificate};

#[derive(Debug, Clone)]
pub struct RelayRegistrationService {
    relays: RelaysRepository,
    certs: Arc<CertRetriever>,
    validator: MtlsAuthValidator,
}

impl RelayRegistrationService {
    pub const fn new(relays: RelaysRepository, certs: Arc<CertRetriever>) -> Self {
        Self {
            relays,
            certs,
            validator: MtlsAuthValidator::new("relay_id"),
        }
    }

    /// Register a relay and hand back its client certificate.
    #[instrument(skip(self, request), fields(rpc = "RegisterRelay"))]
    pub async fn register(
        &self,
        request: Request<RegisterRelayRequest>,
    ) -> Result<Response<RelayCertificateResponse>, Status> {
        let req = request.into_inner();
        let requested = requested_not_after(req.requested_not_after)?;

        let outcome = register_relay(
            &self.relays,
            &self.certs,
            &req.relay_id,
            &req.alias,
            &req.csr,
            requested,
        )
        .await
        .map_err(registration_error_to_status)?;

        Ok(Response::new(certificate_response(
            outcome.relay.id,
            outcome.certificate,
        )))
    }

    /// Issue a fresh certificate to a registered relay. Gated on `relay_id`.
    #[instrument(skip(self, request), fields(rpc = "RenewCertificate"))]
    pub async fn renew(
        &self,
        request: Request<RenewCertificateRequest>,
    ) -> Result<Response<RelayCertificateResponse>, Status> {
        self.validator
            .validate(&request)
            .map_err(auth_error_to_status)?;
        let req = request.into_inner();
        let requested = requested_not_after(req.requested_not_after)?;

        let certificate =
            renew_certificate(&self.relays, &self.certs, &req.relay_id, &req.csr, requested)
                .await
                .map_err(registration_error_to_status)?;

        info!(relay_id = %req.relay_id, "Relay certificate renewed");
        Ok(Response::new(certificate_response(req.relay_id, certificate)))
    }

    #[instrument(skip(self, request), fields(rpc = "UnregisterRelay"))]
    pub async fn unregister(
        &self,
        request: Request<UnregisterRelayRequest>,
    ) -> Result<Response<UnregisterRelayResponse>, Status> {
        let req = request.into_inner();
        self.relays
            .remove_relay(&req.relay_id)
            .await
            .map_err(relay_error_to_status)?;

        Ok(Response::new(UnregisterRelayResponse {
            relay_id: req.relay_id,
        }))
    }

    #[instrument(skip(self, _request), fields(rpc = "ListRelays"))]
    pub async fn list_relays(
        &self,
        _request: Request<ListRelaysRequest>,
    ) -> Result<Response<ListRelaysResponse>, Status> {
        let relays = self
            .relays
            .list_relays()
            .await
            .map_err(relay_error_to_status)?;

        Ok(Response::new(ListRelaysResponse {
            relays: relays.into_iter().map(RelayInfo::from).collect(),
        }))
    }
}

#[allow(clippy::result_large_err)]
fn requested_not_after(timestamp: Option<i64>) -> Result<Option<OffsetDateTime>, Status> {
    timestamp
        .map(|ts| {
            OffsetDateTime::from_unix_timestamp(ts)
                .map_err(|e| Status::invalid_argument(format!("Invalid requested_not_after: {e}")))
        })
        .transpose()
}

fn certificate_response(relay_id: String, cert: IssuedCertificate) -> RelayCertificateResponse {
    RelayCertificateResponse {
        relay_id,
        client_cert: cert.client_cert_pem,
        ca_cert: cert.ca_cert_pem,
        not_valid_before: cert.not_valid_before,
        not_valid_after: cert.not_valid_after,
    }
}
