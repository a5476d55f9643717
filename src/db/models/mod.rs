pub mod credential_models;
pub mod detection_event_models;
pub mod device_models;

pub use credential_models::UpstreamCredential;
pub use detection_event_models::DetectionEvent;
pub use device_models::DeviceToken;
