//! Distributed progress counters with local fail-open mirrors.
//!
//! The backing store's atomic hash increments are the cross-worker truth;
//! when the store is unreachable this process keeps counting locally so a
//! run still finishes and reports. Terminal transition is idempotent: the
//! first worker to observe `completed + failed >= total` wins the
//! `set_nx` and performs the transition exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::model::campaign::CampaignStatus;
use crate::store::kv::KvStore;
use crate::store::sink::ProgressSnapshot;

pub struct ProgressTracker {
    store: Arc<dyn KvStore>,
    campaign_id: String,
    total: u64,
    local_completed: AtomicU64,
    local_failed: AtomicU64,
    local_finalized: AtomicBool,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn KvStore>, campaign_id: impl Into<String>, total: u64) -> Self {
        Self {
            store,
            campaign_id: campaign_id.into(),
            total,
            local_completed: AtomicU64::new(0),
            local_failed: AtomicU64::new(0),
            local_finalized: AtomicBool::new(false),
        }
    }

    fn progress_key(&self) -> String {
        format!("pin:campaign:{}:progress", self.campaign_id)
    }

    fn finalize_key(&self) -> String {
        format!("pin:campaign:{}:finalized", self.campaign_id)
    }

    fn cursor_key(&self) -> String {
        format!("pin:campaign:{}:cursor", self.campaign_id)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn record_completed(&self) -> ProgressSnapshot {
        self.record("completed", &self.local_completed)
    }

    pub fn record_failed(&self) -> ProgressSnapshot {
        self.record("failed", &self.local_failed)
    }

    fn record(&self, field: &str, local: &AtomicU64) -> ProgressSnapshot {
        local.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.store.hash_incr(&self.progress_key(), field, 1) {
            tracing::warn!(
                campaign = %self.campaign_id,
                error = %e,
                "progress increment degraded to local counter"
            );
        }
        self.snapshot()
    }

    /// Current counters, preferring the distributed values.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let completed = self.read_field("completed", &self.local_completed);
        let failed = self.read_field("failed", &self.local_failed);
        ProgressSnapshot {
            completed,
            failed,
            total: self.total,
        }
    }

    fn read_field(&self, field: &str, local: &AtomicU64) -> u64 {
        match self.store.hash_get(&self.progress_key(), field) {
            Ok(Some(v)) => v.max(0) as u64,
            Ok(None) => 0,
            Err(_) => local.load(Ordering::SeqCst),
        }
    }

    /// Perform the terminal transition if the run just finished.
    ///
    /// Returns the terminal status exactly once across all workers (and, via
    /// the local flag, exactly once in this process when the store is down).
    /// Any failed row makes the terminal status `Failed`; a fully clean run
    /// completes.
    pub fn try_finalize(&self) -> Option<CampaignStatus> {
        let snapshot = self.snapshot();
        if !snapshot.is_finished() {
            return None;
        }

        let won = match self.store.set_nx(&self.finalize_key(), "1", None) {
            Ok(won) => won,
            Err(e) => {
                tracing::warn!(
                    campaign = %self.campaign_id,
                    error = %e,
                    "finalize check degraded to local flag"
                );
                !self.local_finalized.swap(true, Ordering::SeqCst)
            }
        };
        if !won {
            return None;
        }

        Some(if snapshot.failed > 0 {
            CampaignStatus::Failed
        } else {
            CampaignStatus::Completed
        })
    }

    /// Next unprocessed row index, persisted so a paused run resumes from
    /// where it stopped instead of from zero.
    pub fn cursor(&self) -> usize {
        match self.store.get(&self.cursor_key()) {
            Ok(Some(v)) => v.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(campaign = %self.campaign_id, error = %e, "cursor read degraded");
                0
            }
        }
    }

    pub fn set_cursor(&self, next_row: usize) {
        if let Err(e) = self
            .store
            .set(&self.cursor_key(), &next_row.to_string(), None)
        {
            tracing::warn!(campaign = %self.campaign_id, error = %e, "cursor write degraded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::kv::{MemoryStore, UnavailableStore};

    #[test]
    fn mixed_outcome_finalizes_as_failed_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let tracker = ProgressTracker::new(store, "c1", 100);

        let mut terminal = Vec::new();
        for i in 0..100 {
            let snapshot = if i < 63 {
                tracker.record_completed()
            } else {
                tracker.record_failed()
            };
            if snapshot.is_finished()
                && let Some(status) = tracker.try_finalize()
            {
                terminal.push(status);
            }
        }

        assert_eq!(terminal, vec![CampaignStatus::Failed]);
        // Late duplicate checks never re-finalize.
        assert_eq!(tracker.try_finalize(), None);
        let s = tracker.snapshot();
        assert_eq!((s.completed, s.failed), (63, 37));
    }

    #[test]
    fn clean_run_completes() {
        let store = Arc::new(MemoryStore::new());
        let tracker = ProgressTracker::new(store, "c2", 3);
        tracker.record_completed();
        tracker.record_completed();
        tracker.record_completed();
        assert_eq!(tracker.try_finalize(), Some(CampaignStatus::Completed));
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let tracker = Arc::new(ProgressTracker::new(store, "c3", 64));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = tracker.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..8 {
                    tracker.record_completed();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let s = tracker.snapshot();
        assert_eq!(s.completed, 64);
        assert_eq!(tracker.try_finalize(), Some(CampaignStatus::Completed));
    }

    #[test]
    fn unavailable_store_fails_open_to_local_counts() {
        let tracker = ProgressTracker::new(Arc::new(UnavailableStore), "c4", 2);
        tracker.record_completed();
        let s = tracker.record_failed();
        assert_eq!((s.completed, s.failed), (1, 1));
        assert_eq!(tracker.try_finalize(), Some(CampaignStatus::Failed));
        assert_eq!(tracker.try_finalize(), None);
    }

    #[test]
    fn cursor_round_trips_and_degrades() {
        let tracker = ProgressTracker::new(Arc::new(MemoryStore::new()), "c5", 10);
        assert_eq!(tracker.cursor(), 0);
        tracker.set_cursor(6);
        assert_eq!(tracker.cursor(), 6);

        let degraded = ProgressTracker::new(Arc::new(UnavailableStore), "c5", 10);
        degraded.set_cursor(6);
        assert_eq!(degraded.cursor(), 0);
    }
}
