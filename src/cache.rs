use std::collections::HashMap;

/// Cache keys are a truncated prefix of the normalized description; two
/// descriptions differing only past the prefix intentionally collide.
pub const FINGERPRINT_LEN: usize = 100;

/// Entries older than a day are recomputed.
pub const DEFAULT_TTL_MS: i64 = 24 * 60 * 60 * 1000;

pub fn fingerprint(description: &str) -> String {
    description
        .to_lowercase()
        .trim()
        .chars()
        .take(FINGERPRINT_LEN)
        .collect()
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub price: String,
    pub timestamp: i64,
}

/// Process-lifetime price cache. Stale entries are ignored on read but never
/// swept; growth is bounded by distinct-fingerprint cardinality, which the
/// truncated key keeps small.
#[derive(Debug)]
pub struct QuoteCache {
    entries: HashMap<String, CacheEntry>,
    ttl_ms: i64,
}

impl QuoteCache {
    pub fn new(ttl_ms: i64) -> Self {
        Self {
            entries: HashMap::new(),
            ttl_ms,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, now_ms())
    }

    pub fn get_at(&self, key: &str, now_ms: i64) -> Option<String> {
        let entry = self.entries.get(key)?;
        if now_ms - entry.timestamp > self.ttl_ms {
            return None;
        }
        Some(entry.price.clone())
    }

    pub fn put(&mut self, key: String, price: String) {
        self.put_at(key, price, now_ms());
    }

    pub fn put_at(&mut self, key: String, price: String, now_ms: i64) {
        self.entries.insert(
            key,
            CacheEntry {
                price,
                timestamp: now_ms,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_normalizes_and_truncates() {
        assert_eq!(fingerprint("  iPhone 13  "), "iphone 13");
        let long_a = format!("{}{}", "x".repeat(FINGERPRINT_LEN), "tail one");
        let long_b = format!("{}{}", "x".repeat(FINGERPRINT_LEN), "tail two");
        // collisions past the prefix are intentional
        assert_eq!(fingerprint(&long_a), fingerprint(&long_b));
        assert_eq!(fingerprint(&long_a).chars().count(), FINGERPRINT_LEN);
    }

    #[test]
    fn fresh_entry_is_returned() {
        let mut cache = QuoteCache::default();
        cache.put_at("iphone 13".into(), "$250".into(), 1_000);
        assert_eq!(cache.get_at("iphone 13", 2_000), Some("$250".into()));
    }

    #[test]
    fn stale_entry_is_ignored() {
        let mut cache = QuoteCache::default();
        cache.put_at("iphone 13".into(), "$250".into(), 0);
        assert_eq!(cache.get_at("iphone 13", DEFAULT_TTL_MS), Some("$250".into()));
        assert_eq!(cache.get_at("iphone 13", DEFAULT_TTL_MS + 1), None);
        // the stale entry stays in the map until overwritten
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn put_is_an_idempotent_upsert() {
        let mut cache = QuoteCache::default();
        cache.put_at("lamp".into(), "$20".into(), 0);
        cache.put_at("lamp".into(), "$25".into(), 10);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at("lamp", 20), Some("$25".into()));
    }
}
