//! Family Tracker
//!
//! Live count and cancellable registry of one family's in-flight tasks.
//! The count, the registry and the published busy flag change together
//! under one lock, so `busy == (in_flight > 0)` holds at every observation.

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::watch;
use uuid::Uuid;

use crate::tasks::{Family, TaskHandle};

/// Consistent view of a family's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilySnapshot {
    pub family: Family,
    pub in_flight: usize,
    pub busy: bool,
}

#[derive(Default)]
struct FamilyState {
    in_flight: usize,
    handles: HashMap<Uuid, TaskHandle>,
}

/// Per-family in-flight tracking
pub struct FamilyTracker {
    family: Family,
    state: Mutex<FamilyState>,
    busy_tx: watch::Sender<bool>,
}

impl FamilyTracker {
    pub fn new(family: Family) -> Self {
        let (busy_tx, _) = watch::channel(false);
        Self {
            family,
            state: Mutex::new(FamilyState::default()),
            busy_tx,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Observe the busy flag
    pub fn busy(&self) -> watch::Receiver<bool> {
        self.busy_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.snapshot().busy
    }

    pub fn in_flight(&self) -> usize {
        self.snapshot().in_flight
    }

    pub fn snapshot(&self) -> FamilySnapshot {
        let state = self.state.lock();
        FamilySnapshot {
            family: self.family,
            in_flight: state.in_flight,
            busy: *self.busy_tx.borrow(),
        }
    }

    /// Handles currently in flight
    pub fn handles(&self) -> Vec<TaskHandle> {
        self.state.lock().handles.values().cloned().collect()
    }

    /// Start tracking a handle
    ///
    /// Returns `false` for a handle that is already tracked or already terminal.
    pub fn register(&self, handle: &TaskHandle) -> bool {
        let mut state = self.state.lock();
        if handle.status().is_terminal() || state.handles.contains_key(&handle.id()) {
            warn!(
                "Refusing to register task {} with family {}",
                handle.id(),
                self.family
            );
            return false;
        }

        state.handles.insert(handle.id(), handle.clone());
        state.in_flight += 1;
        if state.in_flight == 1 {
            self.busy_tx.send_replace(true);
            debug!("Family {} is busy", self.family);
        }
        true
    }

    /// Stop tracking a handle
    ///
    /// Returns `false` if the handle was not tracked; the count is untouched.
    pub fn unregister(&self, handle: &TaskHandle) -> bool {
        let mut state = self.state.lock();
        if state.handles.remove(&handle.id()).is_none() {
            warn!(
                "Task {} is not tracked by family {}",
                handle.id(),
                self.family
            );
            return false;
        }

        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.busy_tx.send_replace(false);
            debug!("Family {} is idle", self.family);
        }
        true
    }

    /// Cancel every tracked handle
    ///
    /// Iterates a snapshot taken under the lock; the lock is released before
    /// cancelling because cancellation re-enters `unregister`. Returns the
    /// number of handles this call actually cancelled.
    pub fn cancel_all(&self) -> usize {
        let handles = self.handles();
        let cancelled = handles.iter().filter(|handle| handle.cancel()).count();
        if cancelled > 0 {
            info!("Cancelled {} task(s) of family {}", cancelled, self.family);
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tracked(tracker: &Arc<FamilyTracker>, input: i64) -> TaskHandle {
        let handle = TaskHandle::new(tracker.family(), input);
        assert!(tracker.register(&handle));
        let hook_tracker = Arc::clone(tracker);
        handle.on_complete(move |handle, _| {
            hook_tracker.unregister(handle);
        });
        handle
    }

    #[test]
    fn test_busy_follows_count() {
        let tracker = Arc::new(FamilyTracker::new(Family::A));
        let busy = tracker.busy();
        assert!(!*busy.borrow());

        let first = tracked(&tracker, 1);
        let second = tracked(&tracker, 2);
        assert_eq!(
            tracker.snapshot(),
            FamilySnapshot {
                family: Family::A,
                in_flight: 2,
                busy: true
            }
        );
        assert!(*busy.borrow());

        first.begin();
        first.complete(Ok(1));
        assert_eq!(tracker.in_flight(), 1);
        assert!(tracker.is_busy());

        second.cancel();
        assert_eq!(tracker.in_flight(), 0);
        assert!(!*busy.borrow());
    }

    #[test]
    fn test_double_register_and_unknown_unregister() {
        let tracker = FamilyTracker::new(Family::B);
        let handle = TaskHandle::new(Family::B, 1);

        assert!(tracker.register(&handle));
        assert!(!tracker.register(&handle));
        assert_eq!(tracker.in_flight(), 1);

        assert!(tracker.unregister(&handle));
        assert!(!tracker.unregister(&handle));
        assert_eq!(tracker.in_flight(), 0);
        assert!(!tracker.is_busy());
    }

    #[test]
    fn test_terminal_handle_not_registered() {
        let tracker = FamilyTracker::new(Family::A);
        let handle = TaskHandle::new(Family::A, 1);
        handle.cancel();
        assert!(!tracker.register(&handle));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn test_cancel_all_drains_to_idle() {
        let tracker = Arc::new(FamilyTracker::new(Family::A));
        let handles: Vec<_> = (0..3).map(|i| tracked(&tracker, i)).collect();
        handles[0].begin();

        assert_eq!(tracker.cancel_all(), 3);
        assert_eq!(tracker.in_flight(), 0);
        assert!(!tracker.is_busy());
        for handle in &handles {
            assert!(handle.is_cancelled());
        }
        assert_eq!(tracker.cancel_all(), 0);
    }

    #[test]
    fn test_concurrent_register_unregister() {
        let tracker = Arc::new(FamilyTracker::new(Family::B));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let handle = tracked(&tracker, t * 1000 + i);
                        let snapshot = tracker.snapshot();
                        assert!(snapshot.in_flight > 0);
                        assert!(snapshot.busy);
                        if i % 2 == 0 {
                            handle.cancel();
                        } else {
                            handle.begin();
                            handle.complete(Ok(i));
                        }
                        let snapshot = tracker.snapshot();
                        assert_eq!(snapshot.busy, snapshot.in_flight > 0);
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(tracker.in_flight(), 0);
        assert!(!tracker.is_busy());
    }
}
