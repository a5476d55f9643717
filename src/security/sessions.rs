use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Transient bearer-token record; never persisted to durable storage
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub token: String,
    pub account_id: String,
    pub expires_at: DateTime<Utc>,
}

/// In-memory session token cache.
///
/// Reads never block other reads; writes take the lock exclusively.
#[derive(Default)]
pub struct SessionCache {
    entries: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionCache {
    /// Create an empty session cache
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, entry: SessionEntry) {
        self.entries.write().await.insert(entry.token.clone(), entry);
    }

    pub async fn get(&self, token: &str) -> Option<SessionEntry> {
        self.entries.read().await.get(token).cloned()
    }

    pub async fn delete(&self, token: &str) {
        self.entries.write().await.remove(token);
    }

    /// Remove every entry whose expiry has passed; returns how many
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Run `sweep_expired` on a fixed interval for the process lifetime
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let removed = cache.sweep_expired().await;
                if removed > 0 {
                    debug!("Swept {} expired sessions", removed);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entry(token: &str, minutes_from_now: i64) -> SessionEntry {
        SessionEntry {
            token: token.to_string(),
            account_id: "alice".to_string(),
            expires_at: Utc::now() + ChronoDuration::minutes(minutes_from_now),
        }
    }

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let cache = SessionCache::new();

        cache.set(entry("tok1", 10)).await;
        let found = cache.get("tok1").await.unwrap();
        assert_eq!(found.account_id, "alice");

        cache.delete("tok1").await;
        assert!(cache.get("tok1").await.is_none());
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_entries() {
        let cache = SessionCache::new();

        cache.set(entry("live", 10)).await;
        cache.set(entry("dead1", -1)).await;
        cache.set(entry("dead2", -30)).await;

        let removed = cache.sweep_expired().await;
        assert_eq!(removed, 2);
        assert!(cache.get("live").await.is_some());
        assert!(cache.get("dead1").await.is_none());
    }

    #[tokio::test]
    async fn sweeper_task_runs_periodically() {
        let cache = Arc::new(SessionCache::new());
        cache.set(entry("dead", -1)).await;

        let handle = cache.spawn_sweeper(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cache.get("dead").await.is_none());
        handle.abort();
    }
}
