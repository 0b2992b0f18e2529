use dashmap::DashMap;
use parking_lot::RwLock;
use questor_models::SearchHit;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Append-only label-search cache, keyed by normalized phrase text.
///
/// Entries are immutable once written: concurrent first-writers racing
/// on the same key are idempotent. One cache is constructed per run and
/// injected into the resolver; there is no process-global instance.
#[derive(Debug, Default)]
pub struct SearchCache {
    entries: DashMap<String, Vec<SearchHit>>,
    stats: RwLock<CacheStats>,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn normalize(text: &str) -> String {
        text.trim().to_lowercase()
    }

    pub fn get(&self, text: &str) -> Option<Vec<SearchHit>> {
        match self.entries.get(&Self::normalize(text)) {
            Some(hits) => {
                self.stats.write().hits += 1;
                Some(hits.clone())
            }
            None => {
                self.stats.write().misses += 1;
                None
            }
        }
    }

    /// First write wins; later writers for the same key are dropped.
    pub fn insert(&self, text: &str, hits: Vec<SearchHit>) {
        self.entries.entry(Self::normalize(text)).or_insert(hits);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            label: None,
            description: None,
        }
    }

    #[test]
    fn keys_are_normalized() {
        let cache = SearchCache::new();
        cache.insert("  Heineken ", vec![hit("Q152057")]);
        let hits = cache.get("heineken").unwrap();
        assert_eq!(hits[0].id, "Q152057");
    }

    #[test]
    fn first_write_wins() {
        let cache = SearchCache::new();
        cache.insert("amsterdam", vec![hit("Q727")]);
        cache.insert("amsterdam", vec![hit("Q9899")]);
        assert_eq!(cache.get("amsterdam").unwrap()[0].id, "Q727");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = SearchCache::new();
        assert!(cache.get("nothing").is_none());
        cache.insert("something", vec![hit("Q1")]);
        cache.get("something");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
