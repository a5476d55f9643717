pub mod detection_events;
pub mod device_tokens;
pub mod upstream_credentials;

pub use detection_events::DetectionEventsRepository;
pub use device_tokens::DeviceTokensRepository;
pub use upstream_credentials::UpstreamCredentialsRepository;
