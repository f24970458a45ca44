//! Fixed-size set of worker threads sharing one job queue.
//!
//! Dropping the sender closes the queue; workers still drain whatever was
//! queued before exiting, so in-flight and queued work is never killed.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crate::error::{PoolError, WorkloadError};
use crate::tasks::WorkItem;

thread_local! {
    /// `(generation, worker index)` of the current pool thread
    pub static WORKER_ID: RefCell<Option<(u64, usize)>> = const { RefCell::new(None) };
}

/// One generation of the pool
pub(crate) struct PoolInstance {
    pub(crate) generation: u64,
    pub(crate) size: usize,
    job_tx: Option<Sender<WorkItem>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl PoolInstance {
    pub(crate) fn spawn(generation: u64, size: usize) -> Result<Self, PoolError> {
        let (job_tx, job_rx) = unbounded::<WorkItem>();
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let job_rx = job_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("pool-{}-worker-{}", generation, index))
                .spawn(move || {
                    WORKER_ID.with(|id| *id.borrow_mut() = Some((generation, index)));
                    worker_loop(job_rx);
                })
                .map_err(|e| PoolError::Spawn(e.to_string()))?;
            workers.push(handle);
        }

        debug!("Spawned pool generation {} with {} workers", generation, size);
        Ok(Self {
            generation,
            size,
            job_tx: Some(job_tx),
            workers,
        })
    }

    /// Queue an item; hands it back if this instance is closed
    pub(crate) fn send(&self, item: WorkItem) -> Result<(), WorkItem> {
        match &self.job_tx {
            Some(tx) => tx.send(item).map_err(|e| e.into_inner()),
            None => Err(item),
        }
    }

    /// Stop accepting work; queued items still run
    pub(crate) fn close(&mut self) {
        self.job_tx.take();
    }

    /// All workers have exited
    pub(crate) fn is_drained(&self) -> bool {
        self.workers.iter().all(|worker| worker.is_finished())
    }

    /// Close and wait for the workers to drain the queue
    pub(crate) fn join(&mut self) {
        self.close();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Worker of pool generation {} panicked", self.generation);
            }
        }
    }
}

impl Drop for PoolInstance {
    fn drop(&mut self) {
        self.join();
    }
}

fn worker_loop(job_rx: Receiver<WorkItem>) {
    while let Ok(item) = job_rx.recv() {
        execute(item);
    }
}

/// Run one item on the current thread
///
/// Skips items cancelled while queued. Errors and panics in the payload end
/// as `Failure` and never take the worker down.
pub(crate) fn execute(item: WorkItem) {
    let WorkItem { handle, payload } = item;
    if !handle.begin() {
        debug!("Skipping task {} cancelled before start", handle.id());
        return;
    }

    let token = handle.token();
    let result = panic::catch_unwind(AssertUnwindSafe(|| payload(&token)))
        .unwrap_or_else(|panic| Err(WorkloadError::Panicked(panic_message(panic.as_ref()))));
    handle.complete(result);
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
