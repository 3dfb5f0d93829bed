//! Relay registry backed by the site database.

use std::sync::Arc;

use relaygate_core::db::DatabaseError;
use tracing::info;

use crate::storage::{Relay, SiteDatabase};
use crate::tasks::TasksRepository;

/// Longest accepted relay id.
const MAX_RELAY_ID_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum RelayRepoError {
    #[error("Relay already registered: {0}")]
    DuplicateRelay(String),

    #[error("Relay not found: {0}")]
    NotFound(String),

    #[error("Invalid relay id {relay_id:?}: {reason}")]
    InvalidRelayId { relay_id: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

/// Relay ids become certificate CNs and socket header values, so they are
/// restricted to a conservative character set.
pub fn validate_relay_id(relay_id: &str) -> Result<(), RelayRepoError> {
    let invalid = |reason: &str| RelayRepoError::InvalidRelayId {
        relay_id: relay_id.to_string(),
        reason: reason.to_string(),
    };

    if relay_id.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if relay_id.len() > MAX_RELAY_ID_LEN {
        return Err(invalid("too long"));
    }
    if !relay_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid("only ASCII letters, digits, '-', '_' and '.' are allowed"));
    }
    Ok(())
}

/// Registry of known relays.
///
/// Removing a relay cascades to its queued tasks.
#[derive(Debug, Clone)]
pub struct RelaysRepository {
    db: SiteDatabase,
    tasks: Arc<TasksRepository>,
}

impl RelaysRepository {
    pub const fn new(db: SiteDatabase, tasks: Arc<TasksRepository>) -> Self {
        Self { db, tasks }
    }

    /// Register a relay, generating a UUIDv4 id when none is given.
    pub async fn add_relay(
        &self,
        relay_id: Option<&str>,
        alias: &str,
    ) -> Result<Relay, RelayRepoError> {
        let relay_id = relay_id.map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        validate_relay_id(&relay_id)?;

        let relay = self
            .db
            .create_relay(&relay_id, alias)
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict(_) => RelayRepoError::DuplicateRelay(relay_id.clone()),
                other => RelayRepoError::Storage(other),
            })?;

        info!(relay_id = %relay.id, alias = %relay.alias, "Relay registered");
        Ok(relay)
    }

    /// Delete a relay together with its tasks and certificate records.
    pub async fn remove_relay(&self, relay_id: &str) -> Result<(), RelayRepoError> {
        // The row goes first so a concurrent create_task sees the relay gone
        // once it holds the queue lock.
        if !self.db.remove_relay(relay_id).await? {
            return Err(RelayRepoError::NotFound(relay_id.to_string()));
        }
        let purged = self.tasks.purge_relay(relay_id).await;

        info!(relay_id = %relay_id, purged_tasks = purged, "Relay removed");
        Ok(())
    }

    pub async fn list_relays(&self) -> Result<Vec<Relay>, RelayRepoError> {
        Ok(self.db.list_relays().await?)
    }

    pub async fn relay_ids(&self) -> Result<Vec<String>, RelayRepoError> {
        Ok(self
            .list_relays()
            .await?
            .into_iter()
            .map(|relay| relay.id)
            .collect())
    }

    pub async fn exists(&self, relay_id: &str) -> Result<bool, RelayRepoError> {
        Ok(self.db.relay_exists(relay_id).await?)
    }

    pub async fn get_relay(&self, relay_id: &str) -> Result<Relay, RelayRepoError> {
        self.db.get_relay(relay_id).await.map_err(|e| match e {
            DatabaseError::NotFound(_) => RelayRepoError::NotFound(relay_id.to_string()),
            other => RelayRepoError::Storage(other),
        })
    }

    /// Record that the relay was just seen.
    pub async fn touch(&self, relay_id: &str) -> Result<(), RelayRepoError> {
        if self.db.touch_relay(relay_id).await? {
            Ok(())
        } else {
            Err(RelayRepoError::NotFound(relay_id.to_string()))
        }
    }

    pub const fn database(&self) -> &SiteDatabase {
        &self.db
    }

    pub const fn tasks(&self) -> &Arc<TasksRepository> {
        &self.tasks
    }
}
