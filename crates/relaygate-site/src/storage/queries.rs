//! Relay registry queries.

use relaygate_core::db::unix_timestamp;

use super::db::SiteDatabase;
use super::models::Relay;
use relaygate_core::db::DatabaseError;

impl SiteDatabase {
    /// Insert a new relay. A duplicate id surfaces as `DatabaseError::Conflict`.
    pub async fn create_relay(&self, id: &str, alias: &str) -> Result<Relay, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query("INSERT INTO relays (id, alias, registered_at, last_seen) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(alias)
            .bind(now)
            .bind(now)
            .execute(self.pool())
            .await?;

        self.get_relay(id).await
    }

    /// Get a relay by ID.
    pub async fn get_relay(&self, id: &str) -> Result<Relay, DatabaseError> {
        sqlx::query_as::<_, Relay>("SELECT * FROM relays WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Relay {id}")))
    }

    /// All relays in registration order.
    pub async fn list_relays(&self) -> Result<Vec<Relay>, DatabaseError> {
        let relays =
            sqlx::query_as::<_, Relay>("SELECT * FROM relays ORDER BY registered_at, id")
                .fetch_all(self.pool())
                .await?;

        Ok(relays)
    }

    pub async fn relay_exists(&self, id: &str) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM relays WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.is_some())
    }

    /// Refresh `last_seen`. Returns `false` if the relay is unknown.
    pub async fn touch_relay(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE relays SET last_seen = ? WHERE id = ?")
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a relay and, through the foreign key, its certificate records.
    pub async fn remove_relay(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM relays WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
