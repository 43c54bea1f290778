//! Runtime state tracking: shutdown detection and the drain lease.

use crate::error::query_failed;
use crate::Result;
use std::time::Duration;

use super::Database;

impl Database {
    /// Check if the last shutdown was unclean
    ///
    /// Returns true if the previous session did not call set_clean_shutdown(),
    /// indicating a crash or forced termination.
    pub async fn was_unclean_shutdown(&self) -> Result<bool> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = 'clean_shutdown'")
                .fetch_optional(&self.pool)
                .await
                .map_err(query_failed("Failed to check shutdown state"))?;

        // Missing or "false" means the last session never reached shutdown()
        Ok(value.is_none_or(|v| v != "true"))
    }

    /// Mark that the application has started
    ///
    /// If shutdown() is not called before the next startup,
    /// was_unclean_shutdown() will return true.
    pub async fn set_clean_start(&self) -> Result<()> {
        self.set_shutdown_flag("false").await
    }

    /// Mark that the application is shutting down cleanly
    pub async fn set_clean_shutdown(&self) -> Result<()> {
        self.set_shutdown_flag("true").await
    }

    async fn set_shutdown_flag(&self, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value, updated_at)
            VALUES ('clean_shutdown', ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to record shutdown state"))?;

        Ok(())
    }

    /// Try to take (or refresh) the queue drain lease for `owner`
    ///
    /// Succeeds when no lease exists, the lease already belongs to `owner`, or
    /// the current lease has expired. A successful call extends the lease to
    /// `now + ttl`.
    pub async fn try_acquire_drain_lease(&self, owner: &str, ttl: Duration) -> Result<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(ttl.as_millis().min(i64::MAX as u128) as i64);

        let result = sqlx::query(
            r#"
            INSERT INTO drain_lease (id, owner, expires_at) VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET owner = excluded.owner, expires_at = excluded.expires_at
            WHERE drain_lease.owner = excluded.owner OR drain_lease.expires_at <= ?
            "#,
        )
        .bind(owner)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(query_failed("Failed to acquire drain lease"))?;

        Ok(result.rows_affected() == 1)
    }

    /// Release the drain lease if `owner` holds it
    pub async fn release_drain_lease(&self, owner: &str) -> Result<()> {
        sqlx::query("DELETE FROM drain_lease WHERE owner = ?")
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(query_failed("Failed to release drain lease"))?;

        Ok(())
    }
}
