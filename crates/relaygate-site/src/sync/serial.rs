//! Config serial file watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::tasks::ConfigSerial;

/// Read the serial from `path`. A missing or blank file means no serial yet.
pub async fn read_config_serial(path: &Path) -> std::io::Result<Option<ConfigSerial>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let serial = content.trim();
            Ok((!serial.is_empty()).then(|| ConfigSerial::new(serial)))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Poll `path` every `interval` and publish changed serials on `tx`.
///
/// The first read happens immediately.
pub fn spawn_serial_watcher(
    path: PathBuf,
    interval: Duration,
    tx: watch::Sender<Option<ConfigSerial>>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!(path = %path.display(), "Config serial watcher started");

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match read_config_serial(&path).await {
                        Ok(Some(serial)) => {
                            tx.send_if_modified(|current| {
                                if current.as_ref() == Some(&serial) {
                                    false
                                } else {
                                    info!(serial = %serial, "Config serial changed");
                                    *current = Some(serial);
                                    true
                                }
                            });
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Failed to read config serial");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("Config serial watcher shutting down");
                    return;
                }
            }
        }
    })
}
