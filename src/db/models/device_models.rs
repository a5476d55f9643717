use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Push-notification registration for one device
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceToken {
    pub id: Uuid,
    /// Local account the device belongs to
    pub account_id: String,
    /// Opaque transport token, unique across accounts
    pub token: String,
    /// Human-readable device name, e.g. "Pixel 6"
    pub device_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Device registration request body
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterDeviceRequest {
    pub token: String,
    #[serde(default)]
    pub device_name: String,
}
