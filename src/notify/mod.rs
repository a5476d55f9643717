pub mod content;
pub mod debounce;
pub mod dispatcher;
pub mod service;

pub use debounce::DebounceCache;
pub use dispatcher::{FcmClient, PushDispatcher, PushError, PushTransport};
pub use service::NotificationService;
