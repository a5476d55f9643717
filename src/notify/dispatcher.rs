use crate::config::NotificationConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;

/// Per-send failure reported by a push transport
#[derive(Debug, Clone, ThisError)]
pub enum PushError {
    /// The registration can never receive messages again and should be pruned
    #[error("token is no longer registered")]
    InvalidToken,

    /// Anything else (network, throttling, upstream 5xx); logged and ignored
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

/// Push notification transport
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Send one notification to one device token
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), PushError>;

    /// Whether the transport has the credentials it needs to send at all
    fn is_configured(&self) -> bool;
}

/// FCM transport over the HTTP send endpoint
pub struct FcmClient {
    endpoint: String,
    server_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    #[serde(default)]
    error: Option<String>,
}

impl FcmClient {
    /// Create a new FCM client from the notification configuration
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            endpoint: config.fcm_endpoint.clone(),
            server_key: config.fcm_server_key.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl PushTransport for FcmClient {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<(), PushError> {
        let payload = serde_json::json!({
            "to": token,
            "priority": "high",
            "notification": {
                "title": title,
                "body": body,
                "sound": "default",
            },
            "data": data,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| PushError::Transient(e.to_string()))?;

        let status = response.status();

        // 404/410 on the registration itself means the token is gone for good
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(PushError::InvalidToken);
        }

        if !status.is_success() {
            return Err(PushError::Transient(format!(
                "push endpoint returned status {}",
                status
            )));
        }

        let parsed: FcmResponse = response
            .json()
            .await
            .map_err(|e| PushError::Transient(e.to_string()))?;

        if let Some(error) = parsed.results.first().and_then(|r| r.error.as_deref()) {
            return match error {
                "NotRegistered" | "InvalidRegistration" | "MissingRegistration" => {
                    Err(PushError::InvalidToken)
                }
                other => Err(PushError::Transient(other.to_string())),
            };
        }

        Ok(())
    }

    fn is_configured(&self) -> bool {
        !self.server_key.is_empty()
    }
}

/// Fans one notification out to a batch of device tokens
pub struct PushDispatcher {
    transport: Arc<dyn PushTransport>,
}

impl PushDispatcher {
    /// Create a new dispatcher over the given transport
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport }
    }

    /// Send one notification per token and return the tokens the transport
    /// reported as permanently invalid.
    ///
    /// Each send is independent: a failure never aborts the batch. Transient
    /// failures are logged and do not count as invalid.
    pub async fn send_to_all(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &HashMap<String, String>,
    ) -> Result<Vec<String>> {
        if !self.transport.is_configured() {
            return Err(
                Error::Dispatch("push transport is not configured".to_string()).into(),
            );
        }

        let mut invalid_tokens = Vec::new();
        let mut success_count = 0usize;
        let mut failure_count = 0usize;

        for token in tokens {
            match self.transport.send(token, title, body, data).await {
                Ok(()) => success_count += 1,
                Err(PushError::InvalidToken) => {
                    failure_count += 1;
                    invalid_tokens.push(token.clone());
                }
                Err(PushError::Transient(reason)) => {
                    failure_count += 1;
                    warn!("Transient push failure for one device: {}", reason);
                }
            }
        }

        debug!(
            "Push batch finished: {} succeeded, {} failed, {} invalid",
            success_count,
            failure_count,
            invalid_tokens.len()
        );

        Ok(invalid_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Transport scripted per token: "invalid" → InvalidToken,
    /// "flaky" → Transient, anything else succeeds
    struct ScriptedTransport {
        configured: bool,
        sent: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(configured: bool) -> Self {
            Self {
                configured,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn send(
            &self,
            token: &str,
            _title: &str,
            _body: &str,
            _data: &HashMap<String, String>,
        ) -> Result<(), PushError> {
            self.sent.lock().unwrap().push(token.to_string());
            if token.starts_with("invalid") {
                Err(PushError::InvalidToken)
            } else if token.starts_with("flaky") {
                Err(PushError::Transient("connection reset".to_string()))
            } else {
                Ok(())
            }
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    fn tokens(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn reports_exactly_the_invalid_tokens() {
        let transport = Arc::new(ScriptedTransport::new(true));
        let dispatcher = PushDispatcher::new(transport.clone());

        let batch = tokens(&["ok1", "invalid1", "ok2", "invalid2"]);
        let invalid = dispatcher
            .send_to_all(&batch, "t", "b", &HashMap::new())
            .await
            .unwrap();

        assert_eq!(invalid, tokens(&["invalid1", "invalid2"]));
        // Every token was attempted; the failures did not abort the batch
        assert_eq!(transport.sent.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn transient_failures_are_not_counted_invalid() {
        let transport = Arc::new(ScriptedTransport::new(true));
        let dispatcher = PushDispatcher::new(transport);

        let batch = tokens(&["flaky1", "ok1"]);
        let invalid = dispatcher
            .send_to_all(&batch, "t", "b", &HashMap::new())
            .await
            .unwrap();

        assert!(invalid.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_transport_fails_without_sending() {
        let transport = Arc::new(ScriptedTransport::new(false));
        let dispatcher = PushDispatcher::new(transport.clone());

        let batch = tokens(&["ok1"]);
        let result = dispatcher
            .send_to_all(&batch, "t", "b", &HashMap::new())
            .await;

        assert!(result.is_err());
        assert!(transport.sent.lock().unwrap().is_empty());
    }
}
