//! Framing of monitoring payloads for the monitoring core socket.
//!
//! Wire format: one ASCII header line of `key:value` pairs separated by `;`,
//! terminated by `\n`, followed by the raw payload bytes.
//!
//! ```text
//! payload_type:fetcher;payload_size:5;config_serial:42;start_timestamp:1700000000;host_by_name:db01;service_description:CPU\nhello
//! ```

use super::handler::ForwardError;

/// Producer tag the monitoring core expects for relay data.
pub const PAYLOAD_TYPE: &str = "fetcher";

/// A monitoring payload and the metadata the core needs to file it.
#[derive(Debug, Clone, Copy)]
pub struct MonitoringDataEnvelope<'a> {
    pub payload: &'a [u8],
    pub host: &'a str,
    pub service: &'a str,
    pub config_serial: &'a str,
    pub start_timestamp: i64,
}

impl MonitoringDataEnvelope<'_> {
    /// The header line including its trailing newline.
    pub fn header(&self) -> Result<String, ForwardError> {
        if self.host.is_empty() {
            return Err(ForwardError::InvalidEnvelope(
                "host_by_name must not be empty".to_string(),
            ));
        }
        for (key, value) in [
            ("config_serial", self.config_serial),
            ("host_by_name", self.host),
            ("service_description", self.service),
        ] {
            check_value(key, value)?;
        }

        Ok(format!(
            "payload_type:{PAYLOAD_TYPE};payload_size:{};config_serial:{};start_timestamp:{};host_by_name:{};service_description:{}\n",
            self.payload.len(),
            self.config_serial,
            self.start_timestamp,
            self.host,
            self.service,
        ))
    }

    /// Header followed by payload.
    pub fn encode(&self) -> Result<Vec<u8>, ForwardError> {
        let header = self.header()?;
        let mut frame = Vec::with_capacity(header.len() + self.payload.len());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(self.payload);
        Ok(frame)
    }
}

fn check_value(key: &str, value: &str) -> Result<(), ForwardError> {
    if !value.is_ascii() {
        return Err(ForwardError::InvalidEnvelope(format!(
            "{key} must be ASCII, got {value:?}"
        )));
    }
    if value.contains([';', '\n', '\r']) {
        return Err(ForwardError::InvalidEnvelope(format!(
            "{key} must not contain ';' or line breaks, got {value:?}"
        )));
    }
    Ok(())
}
