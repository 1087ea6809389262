//! Per-context and process-wide caches.
//!
//! The per-context cache is single-threaded by the state machine and holds
//! typed values (resolved block mappings, receipt tries, raw bodies). At
//! context teardown, byte entries with a non-zero TTL are promoted into the
//! global cache, which an external maintenance task sweeps by time — the
//! core only ever calls get/set/invalidate on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::trie::PatriciaTrie;

/// Typed cache payloads. Views never land here — only owned data, so no
/// entry can outlive bytes it points into.
#[derive(Clone)]
pub enum CacheValue {
    Bytes(Arc<Vec<u8>>),
    Json(Arc<Value>),
    Trie(Arc<PatriciaTrie>),
}

pub struct CacheSlot {
    pub value: CacheValue,
    /// Seconds of global validity after teardown; 0 = context-only.
    pub ttl: u64,
}

/// Cache owned by a single context.
#[derive(Default)]
pub struct CtxCache {
    entries: HashMap<String, CacheSlot>,
}

impl CtxCache {
    pub fn new() -> Self {
        CtxCache::default()
    }

    pub fn get(&self, key: &str) -> Option<&CacheValue> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn get_bytes(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        match self.get(key) {
            Some(CacheValue::Bytes(b)) => Some(b.clone()),
            _ => None,
        }
    }

    pub fn get_json(&self, key: &str) -> Option<Arc<Value>> {
        match self.get(key) {
            Some(CacheValue::Json(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn get_trie(&self, key: &str) -> Option<Arc<PatriciaTrie>> {
        match self.get(key) {
            Some(CacheValue::Trie(t)) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: CacheValue, ttl: u64) {
        self.entries.insert(key.into(), CacheSlot { value, ttl });
    }

    /// Move TTL-bearing byte entries into the process cache. Called once,
    /// at context teardown.
    pub fn promote_to_global(self) {
        let now = unix_now();
        let mut global = GLOBAL_CACHE.lock().unwrap();
        for (key, slot) in self.entries {
            if slot.ttl == 0 {
                continue;
            }
            if let CacheValue::Bytes(bytes) = slot.value {
                global.insert(
                    key,
                    GlobalEntry {
                        bytes,
                        expires_at: now + slot.ttl,
                    },
                );
            }
        }
    }
}

struct GlobalEntry {
    bytes: Arc<Vec<u8>>,
    expires_at: u64,
}

static GLOBAL_CACHE: Lazy<Mutex<HashMap<String, GlobalEntry>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn global_get(key: &str) -> Option<Arc<Vec<u8>>> {
    let cache = GLOBAL_CACHE.lock().unwrap();
    let entry = cache.get(key)?;
    if entry.expires_at <= unix_now() {
        return None;
    }
    Some(entry.bytes.clone())
}

pub fn global_set(key: impl Into<String>, bytes: Arc<Vec<u8>>, ttl: u64) {
    GLOBAL_CACHE.lock().unwrap().insert(
        key.into(),
        GlobalEntry {
            bytes,
            expires_at: unix_now() + ttl,
        },
    );
}

pub fn global_invalidate(key: &str) {
    GLOBAL_CACHE.lock().unwrap().remove(key);
}

/// Drop expired entries; driven by the host's maintenance task.
pub fn global_sweep() {
    let now = unix_now();
    GLOBAL_CACHE.lock().unwrap().retain(|_, e| e.expires_at > now);
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_cache_is_typed() {
        let mut cache = CtxCache::new();
        cache.set("B:head", CacheValue::Bytes(Arc::new(vec![1, 2, 3])), 0);
        assert_eq!(cache.get_bytes("B:head").unwrap()[..], [1, 2, 3]);
        assert!(cache.get_trie("B:head").is_none());
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn promotion_skips_zero_ttl() {
        let mut cache = CtxCache::new();
        cache.set("tmp:a", CacheValue::Bytes(Arc::new(vec![1])), 0);
        cache.set("keep:a", CacheValue::Bytes(Arc::new(vec![2])), 60);
        cache.promote_to_global();
        assert!(global_get("tmp:a").is_none());
        assert_eq!(global_get("keep:a").unwrap()[..], [2]);
        global_invalidate("keep:a");
    }

    #[test]
    fn sweep_removes_expired() {
        global_set("short:x", Arc::new(vec![9]), 0);
        global_sweep();
        assert!(global_get("short:x").is_none());
    }
}
