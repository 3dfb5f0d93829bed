//! Ingestion of monitoring data fetched by relays.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::instrument;

use super::messages::{ForwardMonitoringDataRequest, ForwardMonitoringDataResponse};
use super::status::{auth_error_to_status, forward_error_to_status, relay_error_to_status};
use crate::auth::MtlsAuthValidator;
use crate::forward::ForwardMonitoringDataHandler;
use crate::relays::RelaysRepository;

#[derive(Debug, Clone)]
pub struct MonitoringDataService {
    relays: RelaysRepository,
    forwarder: Arc<ForwardMonitoringDataHandler>,
    validator: MtlsAuthValidator,
}

impl MonitoringDataService {
    pub const fn new(relays: RelaysRepository, forwarder: Arc<ForwardMonitoringDataHandler>) -> Self {
        Self {
            relays,
            forwarder,
            validator: MtlsAuthValidator::new("relay_id"),
        }
    }

    /// Forward a relay's fetch result to the monitoring core.
    #[instrument(skip(self, request), fields(rpc = "ForwardMonitoringData"))]
    pub async fn forward(
        &self,
        request: Request<ForwardMonitoringDataRequest>,
    ) -> Result<Response<ForwardMonitoringDataResponse>, Status> {
        self.validator
            .validate(&request)
            .map_err(auth_error_to_status)?;
        let req = request.into_inner();

        self.relays
            .get_relay(&req.relay_id)
            .await
            .map_err(relay_error_to_status)?;

        let written = self
            .forwarder
            .process(
                &req.payload,
                &req.host,
                &req.config_serial,
                req.timestamp,
                &req.service,
            )
            .await
            .map_err(forward_error_to_status)?;

        Ok(Response::new(ForwardMonitoringDataResponse {
            bytes_sent: u64::try_from(written).unwrap_or(u64::MAX),
        }))
    }
}
