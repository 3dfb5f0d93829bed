//! Background reclamation of expired tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use super::repository::TasksRepository;

/// Spawn a task that calls [`TasksRepository::purge_expired`] every
/// `interval` until `shutdown` changes.
pub fn spawn_task_sweeper(
    tasks: Arc<TasksRepository>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // Skip first immediate tick

        info!(interval_secs = interval.as_secs(), "Task sweeper started");
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let reclaimed = tasks.purge_expired().await;
                    debug!(reclaimed, "Task sweep finished");
                }
                _ = shutdown.changed() => {
                    info!("Task sweeper shutting down");
                    return;
                }
            }
        }
    })
}
