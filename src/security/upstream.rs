use crate::config::UpstreamConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Cookie carrying the upstream session token on a successful login
const AUTH_COOKIE: &str = "auth_token";

/// Upstream NVR HTTP API, reduced to what this backend needs
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Authenticate and return a bearer token
    async fn login(&self, username: &str, password: &str) -> Result<String>;

    /// Whether the given token is still accepted upstream
    async fn verify(&self, token: &str) -> Result<bool>;

    /// All streams known to the NVR; a stream is online iff it has producers
    async fn list_streams(&self, token: &str) -> Result<HashMap<String, StreamInfo>>;
}

/// Stream description from the upstream streams endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamInfo {
    #[serde(default)]
    pub producers: Vec<serde_json::Value>,
}

/// reqwest-backed client for the upstream NVR API
pub struct NvrApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl NvrApiClient {
    /// Create a new client from the upstream configuration
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    fn extract_auth_cookie(response: &reqwest::Response) -> Option<String> {
        response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|cookie| cookie.split(';').next())
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| name.trim() == AUTH_COOKIE)
            .map(|(_, value)| value.trim().to_string())
    }
}

#[async_trait]
impl UpstreamApi for NvrApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        let url = format!("{}/api/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "user": username, "password": password }))
            .send()
            .await
            .map_err(|e| Error::UpstreamAuth(format!("Login request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::UpstreamAuth(format!(
                "Upstream login rejected with status {}",
                response.status()
            ))
            .into());
        }

        Self::extract_auth_cookie(&response).ok_or_else(|| {
            Error::UpstreamAuth(format!("No {} cookie in login response", AUTH_COOKIE)).into()
        })
    }

    async fn verify(&self, token: &str) -> Result<bool> {
        let url = format!("{}/api/auth", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::UpstreamAuth(format!("Verify request failed: {}", e)))?;

        Ok(response.status().is_success())
    }

    async fn list_streams(&self, token: &str) -> Result<HashMap<String, StreamInfo>> {
        let url = format!("{}/api/streams", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Service(format!("Streams request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Service(format!(
                "Failed to list streams: status {}",
                response.status()
            ))
            .into());
        }

        let streams = response
            .json::<HashMap<String, StreamInfo>>()
            .await
            .map_err(|e| Error::Decode(format!("Failed to decode streams response: {}", e)))?;

        Ok(streams)
    }
}
