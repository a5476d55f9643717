pub mod auth;
pub mod refresh;
pub mod sessions;
pub mod upstream;

pub use auth::AuthService;
pub use refresh::CredentialRefresh;
pub use sessions::{SessionCache, SessionEntry};
pub use upstream::{NvrApiClient, StreamInfo, UpstreamApi};
