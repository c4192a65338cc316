//! Debounced repaint scheduling for the interactive adapter.
//!
//! Repaint requests coalesce into at most one pending repaint per frame
//! budget. The scheduler is caller-clocked (the host's event loop passes
//! `Instant`s), so behavior is deterministic and testable without timers,
//! and cancellation on adapter teardown is a plain state reset with no task
//! left behind.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RepaintScheduler {
    budget: Duration,
    deadline: Option<Instant>,
}

impl RepaintScheduler {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            deadline: None,
        }
    }

    /// Request a repaint. Returns `true` when this request scheduled a new
    /// deadline; further requests inside the same frame budget coalesce.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.budget);
        true
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the pending repaint if its deadline has passed.
    pub fn fire_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending repaint. Guaranteed teardown path.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_coalesce_within_one_budget() {
        let mut s = RepaintScheduler::new(Duration::from_millis(16));
        let t0 = Instant::now();

        assert!(s.request(t0));
        assert!(!s.request(t0 + Duration::from_millis(1)));
        assert!(!s.request(t0 + Duration::from_millis(10)));

        // Nothing fires before the deadline.
        assert!(!s.fire_due(t0 + Duration::from_millis(15)));
        assert!(s.fire_due(t0 + Duration::from_millis(16)));

        // Fired and cleared: a new request schedules again.
        assert!(!s.fire_due(t0 + Duration::from_millis(17)));
        assert!(s.request(t0 + Duration::from_millis(18)));
    }

    #[test]
    fn cancel_discards_the_pending_repaint() {
        let mut s = RepaintScheduler::new(Duration::from_millis(16));
        let t0 = Instant::now();
        s.request(t0);
        s.cancel();
        assert!(!s.is_pending());
        assert!(!s.fire_due(t0 + Duration::from_secs(1)));
    }
}
