use crate::messaging::event::{DetectionMessage, DetectionPhase};
use std::collections::HashMap;

/// Rendered notification payload
#[derive(Debug, Clone)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    /// Structured fields for client-side deep-linking
    pub data: HashMap<String, String>,
}

/// Derive title/body/data from a detection message.
///
/// A recognized identity (`sub_label`) personalizes the wording; otherwise
/// the generic label wording is used.
pub fn build_content(message: &DetectionMessage) -> NotificationContent {
    let camera = &message.after.camera;
    let label = &message.after.label;

    let (title, body) = match (&message.after.sub_label, message.phase) {
        (Some(name), DetectionPhase::New) => (
            "Face recognized".to_string(),
            format!("{} spotted {}", camera, name),
        ),
        (Some(name), DetectionPhase::End) => (
            format!("{} has left", name),
            format!("{} detection ended", camera),
        ),
        (Some(name), DetectionPhase::Update) => {
            (name.clone(), format!("{} {}", camera, label))
        }
        (None, DetectionPhase::New) => (
            format!("{} detected", capitalize(label)),
            format!("{} spotted a {}", camera, label),
        ),
        (None, DetectionPhase::End) => (
            format!("{} has left", capitalize(label)),
            format!("{} detection ended", camera),
        ),
        (None, DetectionPhase::Update) => (
            format!("{} update", capitalize(label)),
            format!("{} {}", camera, label),
        ),
    };

    let mut data = HashMap::new();
    data.insert("camera".to_string(), camera.clone());
    data.insert("label".to_string(), label.clone());
    data.insert("event_id".to_string(), message.after.id.clone());
    data.insert("event_type".to_string(), message.phase.to_string());
    data.insert(
        "timestamp".to_string(),
        format!("{:.0}", message.after.start_time),
    );

    NotificationContent { title, body, data }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(phase: &str, sub_label: &str) -> DetectionMessage {
        serde_json::from_str(&format!(
            r#"{{
                "type": "{}",
                "after": {{
                    "id": "evt1",
                    "camera": "front",
                    "label": "person",
                    "sub_label": {},
                    "start_time": 1000.6
                }}
            }}"#,
            phase, sub_label
        ))
        .unwrap()
    }

    #[test]
    fn recognized_identity_personalizes_wording() {
        let content = build_content(&message("new", r#"["John Smith", 0.79]"#));
        assert_eq!(content.title, "Face recognized");
        assert_eq!(content.body, "front spotted John Smith");

        let content = build_content(&message("end", r#""John Smith""#));
        assert_eq!(content.title, "John Smith has left");
        assert_eq!(content.body, "front detection ended");
    }

    #[test]
    fn generic_wording_without_identity() {
        let content = build_content(&message("new", "null"));
        assert_eq!(content.title, "Person detected");
        assert_eq!(content.body, "front spotted a person");

        let content = build_content(&message("end", "null"));
        assert_eq!(content.title, "Person has left");
    }

    #[test]
    fn data_carries_deep_link_fields() {
        let content = build_content(&message("new", "null"));
        assert_eq!(content.data.get("camera").unwrap(), "front");
        assert_eq!(content.data.get("label").unwrap(), "person");
        assert_eq!(content.data.get("event_id").unwrap(), "evt1");
        assert_eq!(content.data.get("event_type").unwrap(), "new");
        assert_eq!(content.data.get("timestamp").unwrap(), "1001");
    }
}
