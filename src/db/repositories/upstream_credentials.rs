use crate::db::models::credential_models::UpstreamCredential;
use crate::error::Error;
use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;

/// Repository for cached upstream NVR credentials
#[derive(Clone)]
pub struct UpstreamCredentialsRepository {
    pool: Arc<PgPool>,
}

impl UpstreamCredentialsRepository {
    /// Create a new upstream credentials repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Active credential for an account, if one has been stored
    pub async fn get_active(&self, account_id: &str) -> Result<Option<UpstreamCredential>> {
        let result = sqlx::query_as::<_, UpstreamCredential>(
            r#"
            SELECT id, account_id, cached_token, last_verified_at, is_active, created_at, updated_at
            FROM upstream_credentials
            WHERE account_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(account_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get upstream credential: {}", e)))?;

        Ok(result)
    }

    /// Insert or update the credential for an account
    pub async fn upsert(&self, credential: &UpstreamCredential) -> Result<UpstreamCredential> {
        let result = sqlx::query_as::<_, UpstreamCredential>(
            r#"
            INSERT INTO upstream_credentials (
                id, account_id, cached_token, last_verified_at, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (account_id) DO UPDATE
            SET cached_token = EXCLUDED.cached_token,
                last_verified_at = EXCLUDED.last_verified_at,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            RETURNING id, account_id, cached_token, last_verified_at, is_active, created_at, updated_at
            "#,
        )
        .bind(credential.id)
        .bind(&credential.account_id)
        .bind(&credential.cached_token)
        .bind(credential.last_verified_at)
        .bind(credential.is_active)
        .bind(credential.created_at)
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to upsert upstream credential: {}", e)))?;

        Ok(result)
    }
}
