//! Site endpoints.
//!
//! Transport-agnostic service structs speaking `tonic::Request` /
//! `tonic::Response` / `tonic::Status`. Relay-facing methods are gated by
//! [`crate::auth::MtlsAuthValidator`] on the `relay_id` field.

pub mod messages;
pub mod monitoring_svc;
pub mod registration_svc;
pub mod status;
pub mod task_svc;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test_helpers;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod registration_svc_tests;


pub use monitoring_svc::MonitoringDataService;
pub use registration_svc::RelayRegistrationService;
pub use task_svc::RelayTaskService;
