//! Bounded time-to-live caches for answers and rewritten queries.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::Instant;

use crate::prompt::GenerationMode;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A thread-safe map whose entries expire `ttl` after insertion.
///
/// When full, expired entries are dropped first; if none have expired, the
/// entry closest to expiry is evicted.
pub struct TtlCache<V> {
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries: max_entries.max(1), entries: Mutex::new(HashMap::new()) }
    }

    /// The live value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: V) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let now = Instant::now();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= self.max_entries {
                let soonest =
                    entries.iter().min_by_key(|(_, e)| e.expires_at).map(|(k, _)| k.clone());
                if let Some(soonest) = soonest {
                    entries.remove(&soonest);
                }
            }
        }
        entries.insert(key, Entry { value, expires_at: now + self.ttl });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Cache key for an answer: SHA-256 of the normalised question and the mode.
///
/// Questions differing only in case or whitespace share a key.
pub fn answer_key(question: &str, mode: GenerationMode) -> String {
    let normalized = question.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(mode.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(10), 4);
        cache.insert("a".into(), 1);
        assert_eq!(cache.get("a"), Some(1));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_the_soonest_expiring() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("old".into(), 1);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("new".into(), 2);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("newest".into(), 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("old"), None);
        assert_eq!(cache.get("new"), Some(2));
        assert_eq!(cache.get("newest"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_a_key_does_not_evict() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.insert("a".into(), 3);
        assert_eq!(cache.get("a"), Some(3));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn answer_key_normalises_question() {
        let a = answer_key("How does the  King move?", GenerationMode::Short);
        let b = answer_key("how does the king move?", GenerationMode::Short);
        let c = answer_key("how does the king move?", GenerationMode::Explain);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
