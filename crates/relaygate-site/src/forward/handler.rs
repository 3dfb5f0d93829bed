//! Unix-socket delivery of framed monitoring data.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use super::envelope::MonitoringDataEnvelope;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Invalid monitoring data envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Failed to send monitoring data to {socket}: {reason}")]
    FailedToSendMonitoringData { socket: String, reason: String },
}

/// Sends relay results to the monitoring core's unix socket.
#[derive(Debug, Clone)]
pub struct ForwardMonitoringDataHandler {
    socket_path: PathBuf,
    timeout: Duration,
}

impl ForwardMonitoringDataHandler {
    pub const fn new(socket_path: PathBuf, timeout: Duration) -> Self {
        Self {
            socket_path,
            timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Frame `payload` and deliver it: connect, write, half-close, close.
    ///
    /// The whole exchange is bounded by the handler's timeout. Returns the
    /// number of bytes written.
    pub async fn process(
        &self,
        payload: &[u8],
        host: &str,
        config_serial: &str,
        timestamp: i64,
        service: &str,
    ) -> Result<usize, ForwardError> {
        let frame = MonitoringDataEnvelope {
            payload,
            host,
            service,
            config_serial,
            start_timestamp: timestamp,
        }
        .encode()?;

        match tokio::time::timeout(self.timeout, self.send(&frame)).await {
            Ok(Ok(())) => {
                debug!(
                    host = %host,
                    service = %service,
                    payload_size = payload.len(),
                    "Forwarded monitoring data"
                );
                Ok(frame.len())
            }
            Ok(Err(e)) => Err(self.send_failure(&e.to_string())),
            Err(_) => Err(self.send_failure(&format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    #[cfg(unix)]
    async fn send(&self, frame: &[u8]) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;

        let mut stream = tokio::net::UnixStream::connect(&self.socket_path).await?;
        stream.write_all(frame).await?;
        stream.shutdown().await?;
        Ok(())
    }

    #[cfg(not(unix))]
    async fn send(&self, _frame: &[u8]) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "unix sockets are not available on this platform",
        ))
    }

    fn send_failure(&self, reason: &str) -> ForwardError {
        warn!(
            socket = %self.socket_path.display(),
            reason = %reason,
            "Failed to forward monitoring data"
        );
        ForwardError::FailedToSendMonitoringData {
            socket: self.socket_path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
