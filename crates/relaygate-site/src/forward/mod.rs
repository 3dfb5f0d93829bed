//! Delivery of relay-fetched monitoring data to the local monitoring core.

mod envelope;
mod handler;

pub use envelope::{MonitoringDataEnvelope, PAYLOAD_TYPE};
pub use handler::{ForwardError, ForwardMonitoringDataHandler};
