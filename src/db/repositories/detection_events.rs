use crate::db::models::detection_event_models::{DetectionEvent, PersonDetectionStats};
use crate::error::Error;
use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;

/// Repository enforcing the "one current event per (camera, label)" view
#[derive(Clone)]
pub struct DetectionEventsRepository {
    pool: Arc<PgPool>,
}

impl DetectionEventsRepository {
    /// Create a new detection events repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Record an event unless its `event_id` is already stored.
    ///
    /// Returns `false` for a duplicate `event_id` (idempotent, not an
    /// error). Otherwise demotes every current row for the same
    /// (camera, label) and inserts the new row as current, both inside one
    /// transaction so a crash can never leave two current rows for a pair.
    pub async fn record_if_new(&self, event: &DetectionEvent) -> Result<bool> {
        let existing: Option<(uuid::Uuid,)> =
            sqlx::query_as("SELECT id FROM detection_events WHERE event_id = $1")
                .bind(&event.event_id)
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to check existing event: {}", e)))?;

        if existing.is_some() {
            return Ok(false);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE detection_events
            SET is_current = FALSE
            WHERE camera = $1 AND label = $2 AND is_current = TRUE
            "#,
        )
        .bind(&event.camera)
        .bind(&event.label)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to demote current event: {}", e)))?;

        let insert = sqlx::query(
            r#"
            INSERT INTO detection_events (
                id, event_id, camera, label, sub_label, start_time, end_time,
                top_score, score, active, stationary, is_current, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, TRUE, $12)
            "#,
        )
        .bind(event.id)
        .bind(&event.event_id)
        .bind(&event.camera)
        .bind(&event.label)
        .bind(&event.sub_label)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.top_score)
        .bind(event.score)
        .bind(event.active)
        .bind(event.stationary)
        .bind(event.created_at)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {}
            // Unique violation: a concurrent delivery of the same event_id
            // slipped past the pre-check and committed first
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505") => {
                tx.rollback().await.ok();
                return Ok(false);
            }
            Err(e) => {
                return Err(
                    Error::Database(format!("Failed to insert detection event: {}", e)).into(),
                );
            }
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit detection event: {}", e)))?;

        Ok(true)
    }

    /// Start time of the newest current event matching the optional filters,
    /// or 0.0 when none exists
    pub async fn last_event_time(
        &self,
        camera: Option<&str>,
        label: Option<&str>,
    ) -> Result<f64> {
        let row: Option<(f64,)> = sqlx::query_as(
            r#"
            SELECT start_time FROM detection_events
            WHERE is_current = TRUE
              AND ($1::text IS NULL OR camera = $1)
              AND ($2::text IS NULL OR label = $2)
            ORDER BY start_time DESC
            LIMIT 1
            "#,
        )
        .bind(camera)
        .bind(label)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get last event time: {}", e)))?;

        Ok(row.map(|(t,)| t).unwrap_or(0.0))
    }

    /// Total person detections plus the distinct recognized identities
    pub async fn person_detection_stats(&self) -> Result<PersonDetectionStats> {
        let (total_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM detection_events WHERE label = 'person'")
                .fetch_one(&*self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to count person events: {}", e)))?;

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT sub_label FROM detection_events
            WHERE label = 'person' AND sub_label IS NOT NULL AND sub_label != ''
            ORDER BY sub_label ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list recognized identities: {}", e)))?;

        Ok(PersonDetectionStats {
            total_count,
            recognized: rows.into_iter().map(|(s,)| s).collect(),
        })
    }

    /// Events whose start time falls inside [start, end], newest first
    pub async fn list_by_time_range(&self, start: f64, end: f64) -> Result<Vec<DetectionEvent>> {
        let result = sqlx::query_as::<_, DetectionEvent>(
            r#"
            SELECT id, event_id, camera, label, sub_label, start_time, end_time,
                   top_score, score, active, stationary, is_current, created_at
            FROM detection_events
            WHERE start_time >= $1 AND start_time <= $2
            ORDER BY start_time DESC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list events by time range: {}", e)))?;

        Ok(result)
    }
}
