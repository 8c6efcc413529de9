use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Exact-match response cache keyed by `(model, assembled context)`. Shared
/// across sessions; a hit replaces the upstream call but the relay still
/// appends the cached text to history.
pub struct ResponseCache {
    entries: Mutex<LruCache<CacheKey, String>>,
}

#[derive(Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    model: String,
    context: String,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, model: &str, context: &str) -> Option<String> {
        let key = CacheKey {
            model: model.to_string(),
            context: context.to_string(),
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(&key).cloned()
    }

    pub fn put(&self, model: &str, context: &str, response: &str) {
        let key = CacheKey {
            model: model.to_string(),
            context: context.to_string(),
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key, response.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_only_on_matching_model_and_context() {
        let cache = ResponseCache::new(8);
        cache.put("mistral", "User: hi\n", "hello");

        assert_eq!(cache.get("mistral", "User: hi\n").as_deref(), Some("hello"));
        assert!(cache.get("llama3", "User: hi\n").is_none());
        assert!(cache.get("mistral", "User: bye\n").is_none());
    }

    #[test]
    fn evicts_least_recently_used_entry_at_capacity() {
        let cache = ResponseCache::new(2);
        cache.put("m", "a", "1");
        cache.put("m", "b", "2");
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("m", "a").is_some());
        cache.put("m", "c", "3");

        assert!(cache.get("m", "a").is_some());
        assert!(cache.get("m", "b").is_none());
        assert!(cache.get("m", "c").is_some());
    }
}
