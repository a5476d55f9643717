use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Short-window suppression of duplicate notifications.
///
/// Keys are `(event_id, phase)` strings. Expired entries are swept by a
/// one-shot task spawned from `mark_sent`, so the map cannot grow without
/// bound even when no further sends happen for a key.
pub struct DebounceCache {
    entries: Arc<RwLock<HashMap<String, Instant>>>,
    window: Duration,
}

impl DebounceCache {
    /// Create a new debounce cache with the given suppression window
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            window,
        }
    }

    /// Whether a send for this key happened within the window
    pub async fn should_suppress(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(last_sent) => last_sent.elapsed() < self.window,
            None => false,
        }
    }

    /// Record a send for this key and schedule a sweep of expired entries
    pub async fn mark_sent(&self, key: &str) {
        self.entries.write().await.insert(key.to_string(), Instant::now());

        let entries = self.entries.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            entries
                .write()
                .await
                .retain(|_, last_sent| last_sent.elapsed() <= window);
        });
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn suppresses_within_window() {
        let cache = DebounceCache::new(Duration::from_millis(100));

        assert!(!cache.should_suppress("evt1_new").await);
        cache.mark_sent("evt1_new").await;
        assert!(cache.should_suppress("evt1_new").await);
    }

    #[tokio::test]
    async fn allows_again_after_window() {
        let cache = DebounceCache::new(Duration::from_millis(30));

        cache.mark_sent("evt1_new").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!cache.should_suppress("evt1_new").await);
    }

    #[tokio::test]
    async fn phases_are_debounced_independently() {
        let cache = DebounceCache::new(Duration::from_millis(100));

        cache.mark_sent("evt1_new").await;
        assert!(cache.should_suppress("evt1_new").await);
        assert!(!cache.should_suppress("evt1_end").await);
    }

    #[tokio::test]
    async fn expired_entries_are_swept() {
        let cache = DebounceCache::new(Duration::from_millis(20));

        cache.mark_sent("evt1_new").await;
        assert_eq!(cache.len().await, 1);

        // The one-shot sweep fires after the window elapses
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.len().await, 0);
    }
}
