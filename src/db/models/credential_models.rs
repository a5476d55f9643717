use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cached upstream NVR authentication material for one local account
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UpstreamCredential {
    pub id: Uuid,
    pub account_id: String,
    /// Last token obtained from the upstream login endpoint
    #[serde(skip_serializing)]
    pub cached_token: String,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpstreamCredential {
    /// Fresh credential for an account that has never logged in upstream
    pub fn new(account_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            cached_token: String::new(),
            last_verified_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the token needs re-verification against the upstream API
    pub fn is_stale(&self, ttl_secs: i64) -> bool {
        match self.last_verified_at {
            Some(at) => (Utc::now() - at).num_seconds() > ttl_secs,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn never_verified_credential_is_stale() {
        let cred = UpstreamCredential::new("alice");
        assert!(cred.is_stale(3600));
    }

    #[test]
    fn staleness_follows_ttl() {
        let mut cred = UpstreamCredential::new("alice");
        cred.last_verified_at = Some(Utc::now() - Duration::minutes(30));
        assert!(!cred.is_stale(3600));

        cred.last_verified_at = Some(Utc::now() - Duration::hours(2));
        assert!(cred.is_stale(3600));
    }
}
