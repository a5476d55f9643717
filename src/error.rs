use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Upstream auth error: {0}")]
    UpstreamAuth(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Service error: {0}")]
    Service(String),
}
