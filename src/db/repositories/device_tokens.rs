use crate::db::models::device_models::DeviceToken;
use crate::error::Error;
use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Repository for push-notification device registrations
#[derive(Clone)]
pub struct DeviceTokensRepository {
    pool: Arc<PgPool>,
}

impl DeviceTokensRepository {
    /// Create a new device tokens repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Register a device token, reactivating it if the same token is
    /// registered again
    pub async fn register(
        &self,
        account_id: &str,
        token: &str,
        device_name: &str,
    ) -> Result<DeviceToken> {
        let result = sqlx::query_as::<_, DeviceToken>(
            r#"
            INSERT INTO device_tokens (
                id, account_id, token, device_name, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, TRUE, $5, $5)
            ON CONFLICT (token) DO UPDATE
            SET account_id = EXCLUDED.account_id,
                device_name = EXCLUDED.device_name,
                is_active = TRUE,
                updated_at = EXCLUDED.updated_at
            RETURNING id, account_id, token, device_name, is_active, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(token)
        .bind(device_name)
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to register device token: {}", e)))?;

        Ok(result)
    }

    /// All active tokens across every account
    pub async fn list_active(&self) -> Result<Vec<DeviceToken>> {
        let result = sqlx::query_as::<_, DeviceToken>(
            r#"
            SELECT id, account_id, token, device_name, is_active, created_at, updated_at
            FROM device_tokens
            WHERE is_active = TRUE
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list active device tokens: {}", e)))?;

        Ok(result)
    }

    /// Delete the given tokens in a single statement; returns how many rows
    /// were removed
    pub async fn delete_many(&self, tokens: &[String]) -> Result<u64> {
        if tokens.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM device_tokens WHERE token = ANY($1)")
            .bind(tokens)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete device tokens: {}", e)))?;

        Ok(result.rows_affected())
    }

    /// Delete a single token owned by the given account
    pub async fn delete_for_account(&self, account_id: &str, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM device_tokens WHERE account_id = $1 AND token = $2")
            .bind(account_id)
            .bind(token)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete device token: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}
