//! Task Runner
//!
//! Orchestration for task families: validates input, builds work items,
//! wires their lifecycle into the family trackers, submits them to the pool
//! and keeps a bounded history for introspection.

use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use super::events::TaskEvent;
use super::handle::{CancelToken, TaskHandle, WorkItem};
use super::types::{Family, Outcome, TaskInfo};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ValidationError, WorkloadError};
use crate::family::{FamilySnapshot, FamilyTracker, ProgressAggregator};
use crate::pool::{PoolConfig, WorkerPool};
use crate::workloads::{self, Workload};

/// Finished tasks kept for introspection, oldest first
struct History {
    tasks: DashMap<Uuid, TaskHandle>,
    finished: Mutex<VecDeque<Uuid>>,
    max_history: usize,
}

impl History {
    fn record_finished(&self, id: Uuid) {
        let mut finished = self.finished.lock();
        finished.push_back(id);
        while finished.len() > self.max_history {
            if let Some(oldest) = finished.pop_front() {
                self.tasks.remove(&oldest);
            }
        }
    }
}

/// Entry point for submitting and cancelling family work
pub struct TaskRunner {
    pool: WorkerPool,
    trackers: HashMap<Family, Arc<FamilyTracker>>,
    workloads: HashMap<Family, Workload>,
    progress: ProgressAggregator,
    history: Arc<History>,
    event_tx: broadcast::Sender<TaskEvent>,
}

impl TaskRunner {
    /// Create a runner with the default workloads
    ///
    /// Progress aggregation runs on the current tokio runtime. Outside one this
    /// fails with [`EngineError::NoRuntime`]; use [`TaskRunner::with_runtime`]
    /// to supply a runtime explicitly.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        Self::with_runtime(config, &runtime)
    }

    /// Create a runner whose progress aggregation runs on `runtime`
    pub fn with_runtime(config: EngineConfig, runtime: &Handle) -> EngineResult<Self> {
        let pool = WorkerPool::new(PoolConfig::new(config.pool_size))?;

        let trackers: HashMap<Family, Arc<FamilyTracker>> = Family::ALL
            .iter()
            .map(|family| (*family, Arc::new(FamilyTracker::new(*family))))
            .collect();
        let workloads = Family::ALL
            .iter()
            .map(|family| (*family, workloads::for_family(*family, &config)))
            .collect();
        let progress = ProgressAggregator::spawn_on(
            runtime,
            Family::ALL.iter().map(|f| trackers[f].busy()),
        );
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        info!(
            "Task runner ready with {} worker(s) for {} families",
            pool.size(),
            trackers.len()
        );

        Ok(Self {
            pool,
            trackers,
            workloads,
            progress,
            history: Arc::new(History {
                tasks: DashMap::new(),
                finished: Mutex::new(VecDeque::new()),
                max_history: config.max_history,
            }),
            event_tx,
        })
    }

    /// Replace the workload run by a family
    pub fn with_workload(
        mut self,
        family: Family,
        workload: impl Fn(i64, &CancelToken) -> Result<i64, WorkloadError> + Send + Sync + 'static,
    ) -> Self {
        self.workloads.insert(family, Arc::new(workload));
        self
    }

    /// Subscribe to task events
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_tx.subscribe()
    }

    /// Parse `raw_input` and submit one task for `family`
    ///
    /// Unparseable input is rejected before anything is created.
    pub fn submit(&self, family: Family, raw_input: &str) -> EngineResult<TaskHandle> {
        let input = parse_input(raw_input)?;
        self.submit_value(family, input)
    }

    /// Submit one task for `family` with an already parsed input
    pub fn submit_value(&self, family: Family, input: i64) -> EngineResult<TaskHandle> {
        let tracker = self.tracker(family);
        let workload = Arc::clone(&self.workloads[&family]);
        let item = WorkItem::new(family, input, move |token| workload(input, token));
        let handle = item.handle().clone();

        // Tracked before it can run, so the terminal hook always finds it
        tracker.register(&handle);
        self.history.tasks.insert(handle.id(), handle.clone());

        let event_tx = self.event_tx.clone();
        handle.on_start(move |handle| {
            let at = handle.started_at().unwrap_or_else(chrono::Utc::now);
            info!(
                target: handle.family().log_target(),
                "Started({}) at {}",
                handle.input(),
                at.to_rfc3339()
            );
            let _ = event_tx.send(TaskEvent::Started {
                id: handle.id().to_string(),
                family: handle.family(),
                input: handle.input(),
                at: at.to_rfc3339(),
            });
        });

        let tracker = Arc::clone(tracker);
        let history = Arc::clone(&self.history);
        let event_tx = self.event_tx.clone();
        handle.on_complete(move |handle, outcome| {
            tracker.unregister(handle);
            history.record_finished(handle.id());
            let _ = event_tx.send(terminal_event(handle, outcome));
        });

        self.pool.submit(item)?;
        Ok(handle)
    }

    /// Cancel every in-flight task of a family, returning how many were cancelled
    pub fn cancel_all(&self, family: Family) -> usize {
        self.tracker(family).cancel_all()
    }

    /// Cancel a single task by ID
    pub fn cancel_task(&self, id: &str) -> bool {
        Uuid::parse_str(id)
            .ok()
            .and_then(|id| self.history.tasks.get(&id).map(|h| h.value().clone()))
            .map(|handle| handle.cancel())
            .unwrap_or(false)
    }

    /// Change the worker count for future submissions; 0 means 1
    pub fn resize_pool(&self, size: usize) -> EngineResult<()> {
        self.pool.resize(size)?;
        Ok(())
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    /// Observe a family's busy flag
    pub fn busy(&self, family: Family) -> watch::Receiver<bool> {
        self.tracker(family).busy()
    }

    pub fn snapshot(&self, family: Family) -> FamilySnapshot {
        self.tracker(family).snapshot()
    }

    /// Observe the aggregate "any work in progress" flag
    pub fn progress(&self) -> watch::Receiver<bool> {
        self.progress.subscribe()
    }

    pub fn in_progress(&self) -> bool {
        self.progress.in_progress()
    }

    /// Get task info by ID
    pub fn task(&self, id: &str) -> Option<TaskInfo> {
        let id = Uuid::parse_str(id).ok()?;
        self.history.tasks.get(&id).map(|h| h.value().info())
    }

    /// List all known tasks, newest first
    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self
            .history
            .tasks
            .iter()
            .map(|h| h.value().info())
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// List in-flight tasks
    pub fn active_tasks(&self) -> Vec<TaskInfo> {
        self.list_tasks()
            .into_iter()
            .filter(|t| t.status.is_active())
            .collect()
    }

    /// Drop finished tasks from the history
    pub fn clear_completed(&self) {
        let mut finished = self.history.finished.lock();
        for id in finished.drain(..) {
            self.history.tasks.remove(&id);
        }
    }

    /// Cancel all work and stop the pool
    pub fn shutdown(&self) {
        if self.pool.is_shut_down() {
            return;
        }
        for family in Family::ALL {
            self.cancel_all(family);
        }
        self.pool.shutdown();
        debug!("Task runner shut down");
    }

    fn tracker(&self, family: Family) -> &Arc<FamilyTracker> {
        &self.trackers[&family]
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn parse_input(raw_input: &str) -> Result<i64, ValidationError> {
    raw_input
        .trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::NotAnInteger(raw_input.to_string()))
}

/// Log the terminal line and build the matching event
fn terminal_event(handle: &TaskHandle, outcome: &Outcome) -> TaskEvent {
    let target = handle.family().log_target();
    let id = handle.id().to_string();
    let duration_ms = handle.elapsed().as_millis() as u64;

    match outcome {
        Outcome::Success(result) => {
            info!(
                target: target,
                "Finished({}) in {}ms with result: {}",
                handle.input(),
                duration_ms,
                result
            );
            TaskEvent::Finished {
                id,
                family: handle.family(),
                input: handle.input(),
                duration_ms,
                result: *result,
            }
        }
        Outcome::Cancelled => {
            info!(
                target: target,
                "Cancelled({}) after {}ms",
                handle.input(),
                duration_ms
            );
            TaskEvent::Cancelled {
                id,
                family: handle.family(),
                input: handle.input(),
                duration_ms,
            }
        }
        Outcome::Failure(err) => {
            warn!(target: target, "Error({}), {}", handle.input(), err);
            TaskEvent::Failed {
                id,
                family: handle.family(),
                input: handle.input(),
                error: err.to_string(),
            }
        }
    }
}
