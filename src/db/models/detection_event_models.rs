use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted detection event.
///
/// Rows are immutable after insert, except for the `is_current` flag: at
/// most one row per (camera, label) carries `is_current = true`, and a newly
/// recorded event demotes the previous holder inside the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DetectionEvent {
    pub id: Uuid,
    /// Identifier assigned by the NVR; unique across deliveries
    pub event_id: String,
    /// Camera (channel) name
    pub camera: String,
    /// Detected class label (person, car, ...)
    pub label: String,
    /// Secondary classification, e.g. a recognized identity
    pub sub_label: Option<String>,
    /// Event start, seconds since the Unix epoch
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub top_score: f64,
    pub score: f64,
    pub active: bool,
    pub stationary: bool,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

/// Person-detection statistics for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct PersonDetectionStats {
    pub total_count: i64,
    /// Distinct recognized identities, lexicographically ordered
    pub recognized: Vec<String>,
}
