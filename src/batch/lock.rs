//! Advisory per-campaign run lock.
//!
//! `set_nx` with a TTL: the TTL is the dead-worker safety net, since a crashed
//! holder's lock expires instead of blocking retries forever. Contention is
//! not an error; the losing invocation exits without side effects. A store
//! failure fails open: the run proceeds unlocked rather than not at all.

use std::sync::Arc;
use std::time::Duration;

use crate::store::kv::KvStore;

pub struct CampaignLock {
    store: Arc<dyn KvStore>,
    key: String,
    held: bool,
}

impl CampaignLock {
    fn key_for(campaign_id: &str) -> String {
        format!("pin:campaign:{campaign_id}:lock")
    }

    /// `None` means another run holds the lock ("skip, already in
    /// progress").
    pub fn acquire(
        store: Arc<dyn KvStore>,
        campaign_id: &str,
        ttl: Duration,
    ) -> Option<CampaignLock> {
        let key = Self::key_for(campaign_id);
        match store.set_nx(&key, "1", Some(ttl)) {
            Ok(true) => Some(Self {
                store,
                key,
                held: true,
            }),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(campaign = campaign_id, error = %e, "lock service down, running unlocked");
                Some(Self {
                    store,
                    key,
                    held: false,
                })
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.held {
            return;
        }
        self.held = false;
        if let Err(e) = self.store.del(&self.key) {
            tracing::warn!(key = %self.key, error = %e, "lock release degraded, TTL will expire it");
        }
    }
}

impl Drop for CampaignLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::kv::{MemoryStore, UnavailableStore};

    #[test]
    fn second_acquire_loses_until_release() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let ttl = Duration::from_secs(60);

        let first = CampaignLock::acquire(store.clone(), "X", ttl).expect("first wins");
        assert!(CampaignLock::acquire(store.clone(), "X", ttl).is_none());

        first.release();
        assert!(CampaignLock::acquire(store, "X", ttl).is_some());
    }

    #[test]
    fn drop_releases_the_lock() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let ttl = Duration::from_secs(60);
        {
            let _held = CampaignLock::acquire(store.clone(), "Y", ttl).unwrap();
            assert!(CampaignLock::acquire(store.clone(), "Y", ttl).is_none());
        }
        assert!(CampaignLock::acquire(store, "Y", ttl).is_some());
    }

    #[test]
    fn ttl_expiry_frees_a_dead_workers_lock() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let held = CampaignLock::acquire(store.clone(), "Z", Duration::from_millis(10)).unwrap();
        std::mem::forget(held); // crashed worker: no release
        std::thread::sleep(Duration::from_millis(20));
        assert!(CampaignLock::acquire(store, "Z", Duration::from_secs(60)).is_some());
    }

    #[test]
    fn store_failure_fails_open() {
        let lock = CampaignLock::acquire(Arc::new(UnavailableStore), "W", Duration::from_secs(60))
            .expect("fail-open acquire");
        assert!(!lock.is_held());
    }

    #[test]
    fn concurrent_acquires_have_one_winner() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                CampaignLock::acquire(store, "render:X", Duration::from_secs(60))
                    .map(std::mem::forget)
                    .is_some()
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
