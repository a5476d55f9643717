use crate::db::models::detection_event_models::DetectionEvent;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Lifecycle stage of a detection event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DetectionPhase {
    New,
    Update,
    End,
}

impl Display for DetectionPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Update => write!(f, "update"),
            Self::End => write!(f, "end"),
        }
    }
}

/// One event snapshot as published by the NVR
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub id: String,
    pub camera: String,
    pub label: String,
    /// On the wire this may be null, a plain string, or a `[name, score]`
    /// pair; it is normalized to the name here so nothing downstream sees
    /// the polymorphism
    #[serde(default, deserialize_with = "deserialize_sub_label")]
    pub sub_label: Option<String>,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub top_score: f64,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub stationary: bool,
}

/// Envelope delivered on the detection feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionMessage {
    #[serde(rename = "type")]
    pub phase: DetectionPhase,
    #[serde(default)]
    pub before: Option<EventSnapshot>,
    pub after: EventSnapshot,
}

impl DetectionMessage {
    /// Suppression key: a "new" and a later "end" for the same event are
    /// debounced independently
    pub fn debounce_key(&self) -> String {
        format!("{}_{}", self.after.id, self.phase)
    }

    /// Build the row to persist from the `after` snapshot
    pub fn to_detection_event(&self) -> DetectionEvent {
        DetectionEvent {
            id: Uuid::new_v4(),
            event_id: self.after.id.clone(),
            camera: self.after.camera.clone(),
            label: self.after.label.clone(),
            sub_label: self.after.sub_label.clone(),
            start_time: self.after.start_time,
            end_time: self.after.end_time,
            top_score: self.after.top_score,
            score: self.after.score,
            active: self.after.active,
            stationary: self.after.stationary,
            is_current: true,
            created_at: Utc::now(),
        }
    }
}

fn deserialize_sub_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;

    let sub_label = match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Array(items) => items
            .into_iter()
            .find_map(|item| item.as_str().map(str::to_string)),
        _ => None,
    };

    Ok(sub_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_envelope() {
        let message: DetectionMessage = serde_json::from_str(
            r#"{
                "type": "new",
                "before": {"id": "evt1", "camera": "front", "label": "person", "start_time": 999.0},
                "after": {
                    "id": "evt1",
                    "camera": "front",
                    "label": "person",
                    "sub_label": null,
                    "start_time": 1000.0,
                    "end_time": null,
                    "top_score": 0.9,
                    "score": 0.85,
                    "active": true,
                    "stationary": false
                }
            }"#,
        )
        .unwrap();

        assert_eq!(message.phase, DetectionPhase::New);
        assert_eq!(message.after.id, "evt1");
        assert_eq!(message.after.camera, "front");
        assert_eq!(message.after.sub_label, None);
        assert_eq!(message.debounce_key(), "evt1_new");
    }

    #[test]
    fn sub_label_string_is_kept() {
        let snapshot: EventSnapshot = serde_json::from_str(
            r#"{"id": "e", "camera": "c", "label": "person", "sub_label": "John Smith"}"#,
        )
        .unwrap();
        assert_eq!(snapshot.sub_label, Some("John Smith".to_string()));
    }

    #[test]
    fn sub_label_pair_keeps_the_name() {
        let snapshot: EventSnapshot = serde_json::from_str(
            r#"{"id": "e", "camera": "c", "label": "person", "sub_label": ["John Smith", 0.79]}"#,
        )
        .unwrap();
        assert_eq!(snapshot.sub_label, Some("John Smith".to_string()));
    }

    #[test]
    fn sub_label_null_or_missing_is_none() {
        let with_null: EventSnapshot = serde_json::from_str(
            r#"{"id": "e", "camera": "c", "label": "person", "sub_label": null}"#,
        )
        .unwrap();
        assert_eq!(with_null.sub_label, None);

        let missing: EventSnapshot =
            serde_json::from_str(r#"{"id": "e", "camera": "c", "label": "person"}"#).unwrap();
        assert_eq!(missing.sub_label, None);
    }

    #[test]
    fn unknown_phase_fails_to_decode() {
        let result: Result<DetectionMessage, _> = serde_json::from_str(
            r#"{"type": "bogus", "after": {"id": "e", "camera": "c", "label": "person"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn persisted_row_mirrors_the_after_snapshot() {
        let message: DetectionMessage = serde_json::from_str(
            r#"{
                "type": "new",
                "after": {
                    "id": "evt9",
                    "camera": "garage",
                    "label": "car",
                    "start_time": 1234.5,
                    "score": 0.7,
                    "top_score": 0.8,
                    "active": true,
                    "stationary": false
                }
            }"#,
        )
        .unwrap();

        let event = message.to_detection_event();
        assert_eq!(event.event_id, "evt9");
        assert_eq!(event.camera, "garage");
        assert_eq!(event.label, "car");
        assert_eq!(event.start_time, 1234.5);
        assert!(event.is_current);
    }
}
