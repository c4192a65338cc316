//! Cache/lock collaborator interface.
//!
//! Every capability here is optional for correctness: progress counters,
//! locks, and rate limits are reliability aids, and all call sites in the
//! batch pipeline fail open (no-op / allow) when the backing service errors.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::foundation::error::{PinError, PinResult};

/// Key-value service with TTLs, atomic hash counters, set-if-not-exists
/// locks, and sliding-window counters.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> PinResult<Option<String>>;
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> PinResult<()>;
    /// Returns `true` when the key was absent and is now set.
    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> PinResult<bool>;
    fn del(&self, key: &str) -> PinResult<()>;
    /// Atomic increment of a hash field; returns the new value. This must be
    /// an increment on the service side, never read-modify-write, because
    /// workers across process boundaries increment concurrently.
    fn hash_incr(&self, key: &str, field: &str, delta: i64) -> PinResult<i64>;
    fn hash_get(&self, key: &str, field: &str) -> PinResult<Option<i64>>;
    /// Count one event in a sliding window and return the current count.
    fn window_incr(&self, key: &str, window: Duration) -> PinResult<u64>;
}

#[derive(Default)]
struct MemoryInner {
    strings: HashMap<String, (String, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, i64>>,
    windows: HashMap<String, Vec<Instant>>,
}

impl MemoryInner {
    fn live_string(&mut self, key: &str, now: Instant) -> Option<&String> {
        let expired = matches!(self.strings.get(key), Some((_, Some(expiry))) if *expiry <= now);
        if expired {
            self.strings.remove(key);
        }
        self.strings.get(key).map(|(v, _)| v)
    }
}

/// In-process store with real TTL semantics. Test-grade stand-in for the
/// external cache service; also what the CLI runs against.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PinResult<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| PinError::store("memory store poisoned"))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> PinResult<Option<String>> {
        let mut inner = self.lock()?;
        Ok(inner.live_string(key, Instant::now()).cloned())
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> PinResult<()> {
        let mut inner = self.lock()?;
        let expiry = ttl.map(|t| Instant::now() + t);
        inner.strings.insert(key.to_owned(), (value.to_owned(), expiry));
        Ok(())
    }

    fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> PinResult<bool> {
        let mut inner = self.lock()?;
        let now = Instant::now();
        if inner.live_string(key, now).is_some() {
            return Ok(false);
        }
        let expiry = ttl.map(|t| now + t);
        inner.strings.insert(key.to_owned(), (value.to_owned(), expiry));
        Ok(true)
    }

    fn del(&self, key: &str) -> PinResult<()> {
        let mut inner = self.lock()?;
        inner.strings.remove(key);
        inner.hashes.remove(key);
        Ok(())
    }

    fn hash_incr(&self, key: &str, field: &str, delta: i64) -> PinResult<i64> {
        let mut inner = self.lock()?;
        let entry = inner
            .hashes
            .entry(key.to_owned())
            .or_default()
            .entry(field.to_owned())
            .or_insert(0);
        *entry += delta;
        Ok(*entry)
    }

    fn hash_get(&self, key: &str, field: &str) -> PinResult<Option<i64>> {
        let inner = self.lock()?;
        Ok(inner.hashes.get(key).and_then(|h| h.get(field)).copied())
    }

    fn window_incr(&self, key: &str, window: Duration) -> PinResult<u64> {
        let mut inner = self.lock()?;
        let now = Instant::now();
        let events = inner.windows.entry(key.to_owned()).or_default();
        events.retain(|t| now.duration_since(*t) < window);
        events.push(now);
        Ok(events.len() as u64)
    }
}

/// A store whose every operation fails, for exercising fail-open paths.
pub struct UnavailableStore;

impl KvStore for UnavailableStore {
    fn get(&self, _key: &str) -> PinResult<Option<String>> {
        Err(PinError::store("store unavailable"))
    }

    fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> PinResult<()> {
        Err(PinError::store("store unavailable"))
    }

    fn set_nx(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> PinResult<bool> {
        Err(PinError::store("store unavailable"))
    }

    fn del(&self, _key: &str) -> PinResult<()> {
        Err(PinError::store("store unavailable"))
    }

    fn hash_incr(&self, _key: &str, _field: &str, _delta: i64) -> PinResult<i64> {
        Err(PinError::store("store unavailable"))
    }

    fn hash_get(&self, _key: &str, _field: &str) -> PinResult<Option<i64>> {
        Err(PinError::store("store unavailable"))
    }

    fn window_incr(&self, _key: &str, _window: Duration) -> PinResult<u64> {
        Err(PinError::store("store unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_nx_wins_once() {
        let store = MemoryStore::new();
        assert!(store.set_nx("lock", "a", None).unwrap());
        assert!(!store.set_nx("lock", "b", None).unwrap());
        store.del("lock").unwrap();
        assert!(store.set_nx("lock", "c", None).unwrap());
    }

    #[test]
    fn ttl_expires_keys() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.get("k").unwrap(), None);
        // An expired lock key can be re-acquired.
        assert!(store.set_nx("k", "v2", None).unwrap());
    }

    #[test]
    fn hash_incr_is_cumulative() {
        let store = MemoryStore::new();
        assert_eq!(store.hash_incr("p", "completed", 1).unwrap(), 1);
        assert_eq!(store.hash_incr("p", "completed", 1).unwrap(), 2);
        assert_eq!(store.hash_incr("p", "failed", 5).unwrap(), 5);
        assert_eq!(store.hash_get("p", "completed").unwrap(), Some(2));
        assert_eq!(store.hash_get("p", "missing").unwrap(), None);
    }

    #[test]
    fn window_counts_recent_events_only() {
        let store = MemoryStore::new();
        assert_eq!(store.window_incr("r", Duration::from_millis(15)).unwrap(), 1);
        assert_eq!(store.window_incr("r", Duration::from_millis(15)).unwrap(), 2);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(store.window_incr("r", Duration::from_millis(15)).unwrap(), 1);
    }

    #[test]
    fn concurrent_set_nx_has_exactly_one_winner() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                store.set_nx("render:X", "1", None).unwrap()
            }));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
    }
}
