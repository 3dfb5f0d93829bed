//! Fan-out of relay-config tasks on config changes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::relays::{RelayRepoError, RelaysRepository};
use crate::tasks::{ConfigSerial, TaskSpec, TasksRepository};

/// Result of one sync round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub serial: ConfigSerial,
    /// Relays that received a task.
    pub enqueued: Vec<String>,
    /// Relays whose task could not be created, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Enqueues a relay-config task for every known relay.
#[derive(Debug, Clone)]
pub struct ConfigSyncTaskProducer {
    relays: RelaysRepository,
    tasks: Arc<TasksRepository>,
}

impl ConfigSyncTaskProducer {
    pub const fn new(relays: RelaysRepository, tasks: Arc<TasksRepository>) -> Self {
        Self { relays, tasks }
    }

    /// One round: a task per relay, no deduplication. A relay whose queue
    /// rejects the task is reported and skipped.
    pub async fn sync(&self, serial: &ConfigSerial) -> Result<SyncReport, RelayRepoError> {
        let mut report = SyncReport {
            serial: serial.clone(),
            enqueued: Vec::new(),
            failed: Vec::new(),
        };

        for relay_id in self.relays.relay_ids().await? {
            let spec = TaskSpec::RelayConfig {
                serial: serial.clone(),
            };
            match self.tasks.create_task(&relay_id, spec).await {
                Ok(_) => report.enqueued.push(relay_id),
                Err(e) => {
                    warn!(relay_id = %relay_id, serial = %serial, error = %e, "Could not enqueue relay config task");
                    report.failed.push((relay_id, e.to_string()));
                }
            }
        }

        info!(
            serial = %serial,
            enqueued = report.enqueued.len(),
            failed = report.failed.len(),
            "Relay config sync finished"
        );
        Ok(report)
    }

    /// Run a sync for the current serial and again on every change, until
    /// `shutdown` changes or the serial channel closes.
    pub fn spawn(
        self,
        mut serial_rx: watch::Receiver<Option<ConfigSerial>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let current = serial_rx.borrow_and_update().clone();
                if let Some(serial) = current {
                    if let Err(e) = self.sync(&serial).await {
                        warn!(serial = %serial, error = %e, "Relay config sync failed");
                    }
                }

                tokio::select! {
                    changed = serial_rx.changed() => {
                        if changed.is_err() {
                            info!("Config serial channel closed, stopping config sync");
                            return;
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("Config sync shutting down");
                        return;
                    }
                }
            }
        })
    }
}
