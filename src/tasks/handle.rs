//! Task Handle
//!
//! One submitted unit of work. The handle's status is a single atomic; every
//! transition is a compare-and-set, so exactly one of natural completion,
//! failure or cancellation wins and the completion hooks fire exactly once.

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::types::{Family, Outcome, TaskInfo, TaskStatus};
use crate::error::WorkloadError;

type StartHook = Box<dyn FnOnce(&TaskHandle) + Send>;
type CompletionHook = Box<dyn FnOnce(&TaskHandle, &Outcome) + Send>;

/// Workload body; receives a token it may poll to stop early
pub type Payload = Box<dyn FnOnce(&CancelToken) -> Result<i64, WorkloadError> + Send>;

#[derive(Default)]
struct Lifecycle {
    started_at: Option<(DateTime<Utc>, Instant)>,
    completed_at: Option<(DateTime<Utc>, Instant)>,
    outcome: Option<Outcome>,
    /// Set once every completion hook registered before the transition has run
    settled: bool,
    /// Thread currently running start hooks; completion waits for it
    starting: Option<ThreadId>,
    on_start: Vec<StartHook>,
    on_complete: Vec<CompletionHook>,
}

struct HandleInner {
    id: Uuid,
    family: Family,
    input: i64,
    status: AtomicU8,
    created_at: DateTime<Utc>,
    created: Instant,
    lifecycle: Mutex<Lifecycle>,
    changed: Condvar,
}

/// Caller-visible token for one unit of work
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<HandleInner>,
}

impl TaskHandle {
    pub(crate) fn new(family: Family, input: i64) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                family,
                input,
                status: AtomicU8::new(TaskStatus::Pending as u8),
                created_at: Utc::now(),
                created: Instant::now(),
                lifecycle: Mutex::new(Lifecycle::default()),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn family(&self) -> Family {
        self.inner.family
    }

    pub fn input(&self) -> i64 {
        self.inner.input
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == TaskStatus::Cancelled
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lifecycle.lock().started_at.map(|(at, _)| at)
    }

    /// Terminal outcome, once reached
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.lifecycle.lock().outcome.clone()
    }

    /// Time since the task started (or was created, if it never started),
    /// up to its terminal transition
    pub fn elapsed(&self) -> Duration {
        let lifecycle = self.inner.lifecycle.lock();
        let from = lifecycle
            .started_at
            .map(|(_, at)| at)
            .unwrap_or(self.inner.created);
        match lifecycle.completed_at {
            Some((_, to)) => to.saturating_duration_since(from),
            None => from.elapsed(),
        }
    }

    /// Token a workload can poll for cancellation
    pub fn token(&self) -> CancelToken {
        CancelToken {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Cancel the task
    ///
    /// Returns `true` if this call moved the task to `Cancelled`. A task that
    /// already reached a terminal state is left untouched.
    pub fn cancel(&self) -> bool {
        let mut current = self.inner.status.load(Ordering::Acquire);
        loop {
            if TaskStatus::from_u8(current).is_terminal() {
                return false;
            }
            match self.inner.status.compare_exchange(
                current,
                TaskStatus::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.settle(Outcome::Cancelled);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Register a callback for the start of execution
    ///
    /// Runs at most once, and only if the task actually starts. Runs
    /// immediately if the task is already past its start.
    pub fn on_start(&self, hook: impl FnOnce(&TaskHandle) + Send + 'static) {
        let mut lifecycle = self.inner.lifecycle.lock();
        if lifecycle.started_at.is_some() {
            drop(lifecycle);
            hook(self);
        } else if lifecycle.outcome.is_none() {
            lifecycle.on_start.push(Box::new(hook));
        }
    }

    /// Register a callback for the terminal outcome
    ///
    /// Runs exactly once. Runs immediately if the task is already terminal.
    pub fn on_complete(&self, hook: impl FnOnce(&TaskHandle, &Outcome) + Send + 'static) {
        let mut lifecycle = self.inner.lifecycle.lock();
        match lifecycle.outcome.clone() {
            Some(outcome) => {
                drop(lifecycle);
                hook(self, &outcome);
            }
            None => lifecycle.on_complete.push(Box::new(hook)),
        }
    }

    /// Block until the task is terminal and its completion hooks have run
    pub fn wait(&self) -> Outcome {
        let mut lifecycle = self.inner.lifecycle.lock();
        loop {
            if lifecycle.settled {
                if let Some(outcome) = lifecycle.outcome.clone() {
                    return outcome;
                }
            }
            self.inner.changed.wait(&mut lifecycle);
        }
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let mut lifecycle = self.inner.lifecycle.lock();
        while !lifecycle.settled {
            if self
                .inner
                .changed
                .wait_until(&mut lifecycle, deadline)
                .timed_out()
            {
                break;
            }
        }
        if lifecycle.settled {
            lifecycle.outcome.clone()
        } else {
            None
        }
    }

    /// Snapshot for display
    pub fn info(&self) -> TaskInfo {
        let status = self.status();
        let duration_ms = self
            .started_at()
            .map(|_| self.elapsed().as_millis() as u64);
        let lifecycle = self.inner.lifecycle.lock();
        let (result, error) = match &lifecycle.outcome {
            Some(Outcome::Success(value)) => (Some(*value), None),
            Some(Outcome::Failure(err)) => (None, Some(err.to_string())),
            _ => (None, None),
        };

        TaskInfo {
            id: self.inner.id.to_string(),
            family: self.inner.family,
            input: self.inner.input,
            status,
            created_at: self.inner.created_at.to_rfc3339(),
            started_at: lifecycle.started_at.map(|(at, _)| at.to_rfc3339()),
            completed_at: lifecycle.completed_at.map(|(at, _)| at.to_rfc3339()),
            duration_ms,
            result,
            error,
        }
    }

    /// Move `Pending -> Running` and fire start hooks
    ///
    /// A terminal transition racing with this call waits for the start hooks
    /// to return, so start hooks never observe events after completion.
    /// Returns `false` if the task was cancelled while queued.
    pub(crate) fn begin(&self) -> bool {
        if self
            .inner
            .status
            .compare_exchange(
                TaskStatus::Pending as u8,
                TaskStatus::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        let hooks = {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.started_at = Some((Utc::now(), Instant::now()));
            if lifecycle.outcome.is_some() {
                // Cancelled between the CAS and here; start hooks were dropped
                return true;
            }
            lifecycle.starting = Some(thread::current().id());
            std::mem::take(&mut lifecycle.on_start)
        };
        for hook in hooks {
            hook(self);
        }

        self.inner.lifecycle.lock().starting = None;
        self.inner.changed.notify_all();
        true
    }

    /// Move `Running` to its natural terminal state
    ///
    /// Loses silently to a concurrent cancellation.
    pub(crate) fn complete(&self, result: Result<i64, WorkloadError>) -> bool {
        let outcome = match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        };
        if self
            .inner
            .status
            .compare_exchange(
                TaskStatus::Running as u8,
                outcome.status() as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        self.settle(outcome);
        true
    }

    /// Fail a task that was never accepted for execution
    pub(crate) fn reject(&self, err: WorkloadError) -> bool {
        if self
            .inner
            .status
            .compare_exchange(
                TaskStatus::Pending as u8,
                TaskStatus::Failed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        self.settle(Outcome::Failure(err));
        true
    }

    /// Record the outcome and run completion hooks; only the CAS winner gets here
    fn settle(&self, outcome: Outcome) {
        let hooks = {
            let mut lifecycle = self.inner.lifecycle.lock();
            // A start hook settling its own task must not wait on itself
            let me = thread::current().id();
            while lifecycle.starting.is_some_and(|id| id != me) {
                self.inner.changed.wait(&mut lifecycle);
            }
            lifecycle.completed_at = Some((Utc::now(), Instant::now()));
            lifecycle.outcome = Some(outcome.clone());
            lifecycle.on_start.clear();
            std::mem::take(&mut lifecycle.on_complete)
        };
        for hook in hooks {
            hook(self, &outcome);
        }

        self.inner.lifecycle.lock().settled = true;
        self.inner.changed.notify_all();
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("family", &self.inner.family)
            .field("input", &self.inner.input)
            .field("status", &self.status())
            .finish()
    }
}

/// Cooperative cancellation flag handed to workloads
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<HandleInner>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.inner.status.load(Ordering::Acquire) == TaskStatus::Cancelled as u8
    }

    /// `Err(Interrupted)` once cancelled, for use with `?` inside workloads
    pub fn check(&self) -> Result<(), WorkloadError> {
        if self.is_cancelled() {
            Err(WorkloadError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Unit of work bound to its handle; submitted at most once
pub struct WorkItem {
    pub(crate) handle: TaskHandle,
    pub(crate) payload: Payload,
}

impl WorkItem {
    pub fn new(
        family: Family,
        input: i64,
        payload: impl FnOnce(&CancelToken) -> Result<i64, WorkloadError> + Send + 'static,
    ) -> Self {
        Self {
            handle: TaskHandle::new(family, input),
            payload: Box::new(payload),
        }
    }

    /// Handle that will track this item once submitted
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_hook(handle: &TaskHandle) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = Arc::clone(&count);
        handle.on_complete(move |_, _| {
            hook_count.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_natural_completion() {
        let handle = TaskHandle::new(Family::A, 1);
        let count = counting_hook(&handle);

        assert!(handle.begin());
        assert_eq!(handle.status(), TaskStatus::Running);
        assert!(handle.started_at().is_some());
        assert!(handle.complete(Ok(42)));

        assert_eq!(handle.wait(), Outcome::Success(42));
        assert_eq!(handle.status(), TaskStatus::Completed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let handle = TaskHandle::new(Family::A, 1);
        let count = counting_hook(&handle);

        handle.begin();
        handle.complete(Ok(7));
        assert!(!handle.cancel());
        assert!(!handle.cancel());

        assert_eq!(handle.status(), TaskStatus::Completed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_completion_after_cancel_loses() {
        let handle = TaskHandle::new(Family::B, 2);
        let count = counting_hook(&handle);

        handle.begin();
        assert!(handle.cancel());
        assert!(!handle.complete(Ok(1)));
        assert!(!handle.complete(Err(WorkloadError::Interrupted)));

        assert_eq!(handle.outcome(), Some(Outcome::Cancelled));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancelled_while_pending_never_starts() {
        let handle = TaskHandle::new(Family::B, 2);
        let started = Arc::new(AtomicUsize::new(0));
        let hook_started = Arc::clone(&started);
        handle.on_start(move |_| {
            hook_started.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.cancel());
        assert!(!handle.begin());
        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert!(handle.started_at().is_none());
    }

    #[test]
    fn test_late_hook_runs_immediately() {
        let handle = TaskHandle::new(Family::A, 1);
        handle.reject(WorkloadError::Rejected);

        let count = counting_hook(&handle);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(
            handle.wait(),
            Outcome::Failure(WorkloadError::Rejected)
        );
    }

    #[test]
    fn test_concurrent_cancel_and_complete_fire_once() {
        for _ in 0..200 {
            let handle = TaskHandle::new(Family::A, 1);
            let count = counting_hook(&handle);
            handle.begin();

            let canceller = handle.clone();
            let t1 = std::thread::spawn(move || canceller.cancel());
            let completer = handle.clone();
            let t2 = std::thread::spawn(move || completer.complete(Ok(1)));
            let cancelled = t1.join().unwrap();
            let completed = t2.join().unwrap();

            assert!(cancelled ^ completed);
            handle.wait();
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_cancel_during_slow_start_hook_waits_for_it() {
        for _ in 0..5 {
            let handle = TaskHandle::new(Family::A, 1);
            let order = Arc::new(Mutex::new(Vec::new()));

            let start_order = Arc::clone(&order);
            handle.on_start(move |_| {
                std::thread::sleep(Duration::from_millis(30));
                start_order.lock().push("started");
            });
            let done_order = Arc::clone(&order);
            handle.on_complete(move |_, _| done_order.lock().push("terminal"));

            let worker = handle.clone();
            let t = std::thread::spawn(move || worker.begin());
            std::thread::sleep(Duration::from_millis(5));
            handle.cancel();
            assert!(t.join().unwrap());

            assert_eq!(handle.wait(), Outcome::Cancelled);
            assert_eq!(*order.lock(), vec!["started", "terminal"]);
        }
    }

    #[test]
    fn test_start_hook_may_cancel_own_task() {
        let handle = TaskHandle::new(Family::B, 3);
        let count = counting_hook(&handle);
        handle.on_start(|h| {
            assert!(h.cancel());
        });

        assert!(handle.begin());
        assert_eq!(handle.wait(), Outcome::Cancelled);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_timeout_on_pending() {
        let handle = TaskHandle::new(Family::A, 1);
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_token_observes_cancel() {
        let handle = TaskHandle::new(Family::A, 1);
        let token = handle.token();
        assert!(token.check().is_ok());
        handle.cancel();
        assert_eq!(token.check(), Err(WorkloadError::Interrupted));
    }
}
