//! Request and response messages of the site endpoints.

use serde::{Deserialize, Serialize};

use crate::auth::PathParams;
use crate::storage::Relay;
use crate::tasks::{Task, TaskSpec, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRelayRequest {
    pub relay_id: String,
    pub alias: String,
    /// PEM-encoded CSR whose subject CN equals `relay_id`.
    pub csr: String,
    /// Unix timestamp; the certificate never outlives three months.
    #[serde(default)]
    pub requested_not_after: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewCertificateRequest {
    pub relay_id: String,
    pub csr: String,
    #[serde(default)]
    pub requested_not_after: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayCertificateResponse {
    pub relay_id: String,
    pub client_cert: String,
    pub ca_cert: String,
    pub not_valid_before: i64,
    pub not_valid_after: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterRelayRequest {
    pub relay_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterRelayResponse {
    pub relay_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRelaysRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayInfo {
    pub relay_id: String,
    pub alias: String,
    pub registered_at: i64,
    pub last_seen: i64,
}

impl From<Relay> for RelayInfo {
    fn from(relay: Relay) -> Self {
        Self {
            relay_id: relay.id,
            alias: relay.alias,
            registered_at: relay.registered_at,
            last_seen: relay.last_seen,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRelaysResponse {
    pub relays: Vec<RelayInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub relay_id: String,
    pub spec: TaskSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollTasksRequest {
    pub relay_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollTasksResponse {
    pub tasks: Vec<Task>,
}

/// Outcome (DONE) or failure reason (FAILED) reported by a relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultRequest {
    pub relay_id: String,
    pub task_id: String,
    pub result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskRequest {
    pub relay_id: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    pub task: Task,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardMonitoringDataRequest {
    pub relay_id: String,
    pub payload: Vec<u8>,
    pub host: String,
    pub service: String,
    pub config_serial: String,
    /// Unix timestamp at which the relay started fetching.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardMonitoringDataResponse {
    pub bytes_sent: u64,
}

macro_rules! relay_path_params {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl PathParams for $ty {
                fn path_param(&self, field: &str) -> Option<&str> {
                    (field == "relay_id").then_some(self.relay_id.as_str())
                }
            }
        )+
    };
}

relay_path_params!(
    RenewCertificateRequest,
    PollTasksRequest,
    TaskResultRequest,
    ForwardMonitoringDataRequest,
);
