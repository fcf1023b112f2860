// Content-addressed TTL cache for successful tool results

use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

const SHARD_COUNT: usize = 16;

/// Content hash of a tool call (tool name + canonical arguments)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn for_call(tool: &str, arguments: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tool.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_json(arguments).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    fn shard(&self) -> usize {
        // Keys are hex digests, so the leading byte is uniformly distributed
        u8::from_str_radix(self.0.get(..2).unwrap_or("0"), 16).unwrap_or(0) as usize % SHARD_COUNT
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize a value with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Cache statistics reported through `server/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_seconds: u64,
}

/// In-memory TTL cache, sharded to keep lock hold times short.
/// Each shard is bounded and evicts its least recently used entry when full.
pub struct ResultCache {
    shards: Vec<Mutex<LruCache<CacheKey, CacheEntry>>>,
    capacity: usize,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// `max_entries` is spread evenly over the shards, at least one entry each
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        let per_shard =
            NonZeroUsize::new(max_entries.div_ceil(SHARD_COUNT)).unwrap_or(NonZeroUsize::MIN);

        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
            capacity: per_shard.get() * SHARD_COUNT,
            default_ttl: default_ttl.max(Duration::from_millis(1)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a value; expired entries are evicted and count as misses
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        let mut shard = self.shards[key.shard()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if shard.peek(key).is_some_and(|entry| entry.is_expired(now)) {
            shard.pop(key);
        }
        let value = shard.get(key).map(|entry| entry.value.clone());
        drop(shard);

        match &value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    pub fn set(&self, key: CacheKey, value: Value) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Store a value; expired entries of the shard are dropped first, then the
    /// least recently used one if the shard is still full
    pub fn set_with_ttl(&self, key: CacheKey, value: Value, ttl: Duration) {
        let created_at = Instant::now();
        let entry = CacheEntry {
            value,
            created_at,
            expires_at: created_at + ttl.max(Duration::from_millis(1)),
        };
        debug_assert!(entry.expires_at > entry.created_at);

        let mut shard = self.shards[key.shard()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<CacheKey> = shard
            .iter()
            .filter(|(_, entry)| entry.is_expired(created_at))
            .map(|(key, _)| key.clone())
            .collect();
        for stale in &expired {
            shard.pop(stale);
        }
        shard.put(key, entry);
    }

    /// Drop every entry and reset hit/miss counters
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64 * 1000.0).round() / 1000.0
        } else {
            0.0
        };

        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits,
            misses,
            hit_rate,
            ttl_seconds: self.default_ttl.as_secs(),
        }
    }
}
