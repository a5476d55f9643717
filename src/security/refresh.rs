use crate::db::models::credential_models::UpstreamCredential;
use crate::security::upstream::UpstreamApi;
use chrono::Utc;
use log::{debug, info, warn};

/// Keeps a cached upstream token usable on a time-to-live basis.
///
/// A credential is Fresh while its last verification is within the TTL and
/// Stale otherwise. Stale credentials are re-verified; a rejected or failed
/// verification falls back to a full login. When even the login fails the
/// stale token is kept and used as-is: failing open here is deliberate, so
/// an upstream outage never blocks local logins.
pub struct CredentialRefresh {
    ttl_secs: i64,
}

impl CredentialRefresh {
    /// Create a refresher with the given verification TTL
    pub fn new(ttl_secs: i64) -> Self {
        Self { ttl_secs }
    }

    /// Refresh the credential if stale. Returns `true` when the credential
    /// was modified and should be persisted by the caller.
    pub async fn ensure_fresh(
        &self,
        api: &dyn UpstreamApi,
        credential: &mut UpstreamCredential,
        username: &str,
        password: &str,
    ) -> bool {
        if !credential.is_stale(self.ttl_secs) {
            return false;
        }

        match api.verify(&credential.cached_token).await {
            Ok(true) => {
                debug!("Upstream token for {} still valid", credential.account_id);
                credential.last_verified_at = Some(Utc::now());
                return true;
            }
            Ok(false) => {
                debug!("Upstream token for {} rejected", credential.account_id);
            }
            Err(e) => {
                warn!("Upstream verify failed for {}: {}", credential.account_id, e);
            }
        }

        match api.login(username, password).await {
            Ok(token) => {
                info!("Refreshed upstream token for {}", credential.account_id);
                credential.cached_token = token;
                credential.last_verified_at = Some(Utc::now());
                true
            }
            Err(e) => {
                // Fail open: keep using the stale token rather than block login
                warn!(
                    "Upstream credential refresh failed for {}, keeping stale token: {}",
                    credential.account_id, e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockUpstream {
        verify_result: Result<bool, String>,
        login_result: Result<String, String>,
        verify_calls: AtomicUsize,
        login_calls: AtomicUsize,
    }

    impl MockUpstream {
        fn new(verify_result: Result<bool, String>, login_result: Result<String, String>) -> Self {
            Self {
                verify_result,
                login_result,
                verify_calls: AtomicUsize::new(0),
                login_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UpstreamApi for MockUpstream {
        async fn login(&self, _username: &str, _password: &str) -> Result<String> {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            self.login_result
                .clone()
                .map_err(|e| anyhow::anyhow!("{}", e))
        }

        async fn verify(&self, _token: &str) -> Result<bool> {
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            self.verify_result
                .clone()
                .map_err(|e| anyhow::anyhow!("{}", e))
        }

        async fn list_streams(
            &self,
            _token: &str,
        ) -> Result<HashMap<String, crate::security::upstream::StreamInfo>> {
            Ok(HashMap::new())
        }
    }

    fn stale_credential(token: &str, hours_ago: i64) -> UpstreamCredential {
        let mut cred = UpstreamCredential::new("alice");
        cred.cached_token = token.to_string();
        cred.last_verified_at = Some(Utc::now() - Duration::hours(hours_ago));
        cred
    }

    #[tokio::test]
    async fn fresh_credential_is_left_alone() {
        let api = MockUpstream::new(Ok(true), Ok("T2".to_string()));
        let refresh = CredentialRefresh::new(3600);
        let mut cred = stale_credential("T1", 0);

        assert!(!refresh.ensure_fresh(&api, &mut cred, "alice", "pw").await);
        assert_eq!(cred.cached_token, "T1");
        assert_eq!(api.verify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_verify_replaces_the_token() {
        // Verified 2 hours ago with a 1 hour TTL, verify says no, login works
        let api = MockUpstream::new(Ok(false), Ok("T2".to_string()));
        let refresh = CredentialRefresh::new(3600);
        let mut cred = stale_credential("T1", 2);
        let stamped_before = cred.last_verified_at.unwrap();

        assert!(refresh.ensure_fresh(&api, &mut cred, "alice", "pw").await);
        assert_eq!(cred.cached_token, "T2");
        assert!(cred.last_verified_at.unwrap() > stamped_before);
        assert_eq!(api.login_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn successful_verify_only_restamps() {
        let api = MockUpstream::new(Ok(true), Ok("T2".to_string()));
        let refresh = CredentialRefresh::new(3600);
        let mut cred = stale_credential("T1", 2);

        assert!(refresh.ensure_fresh(&api, &mut cred, "alice", "pw").await);
        assert_eq!(cred.cached_token, "T1");
        assert!(!cred.is_stale(3600));
        assert_eq!(api.login_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn refresh_failure_keeps_the_stale_token() {
        let api = MockUpstream::new(Err("timeout".to_string()), Err("timeout".to_string()));
        let refresh = CredentialRefresh::new(3600);
        let mut cred = stale_credential("T1", 2);

        // Fails open: no modification, caller proceeds with the stale token
        assert!(!refresh.ensure_fresh(&api, &mut cred, "alice", "pw").await);
        assert_eq!(cred.cached_token, "T1");
        assert!(cred.is_stale(3600));
    }
}
