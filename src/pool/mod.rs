//! Worker Pool
//!
//! Resizable pool of OS threads executing submitted work items.
//!
//! Resizing never touches running work: a new generation of workers is
//! spawned for subsequent submissions while the previous generation is
//! closed and left to drain its queue in the background.

mod worker;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, WorkloadError};
use crate::tasks::{TaskHandle, WorkItem};

pub use worker::WORKER_ID;
use worker::PoolInstance;

/// Pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub size: usize,
}

impl PoolConfig {
    /// A pool always has at least one worker
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Resizable fixed-size thread pool
pub struct WorkerPool {
    current: RwLock<Option<PoolInstance>>,
    retired: Mutex<Vec<PoolInstance>>,
    config: Mutex<PoolConfig>,
    next_generation: Mutex<u64>,
}

impl WorkerPool {
    /// Create a pool with `config.size` workers
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let config = PoolConfig::new(config.size);
        let instance = PoolInstance::spawn(0, config.size)?;

        Ok(Self {
            current: RwLock::new(Some(instance)),
            retired: Mutex::new(Vec::new()),
            config: Mutex::new(config),
            next_generation: Mutex::new(1),
        })
    }

    /// Current sizing
    pub fn config(&self) -> PoolConfig {
        *self.config.lock()
    }

    /// Worker count used for new submissions
    pub fn size(&self) -> usize {
        self.config().size
    }

    /// Number of retired generations still draining
    pub fn draining(&self) -> usize {
        let mut retired = self.retired.lock();
        retired.retain(|instance| !instance.is_drained());
        retired.len()
    }

    /// Queue an item for execution and return its handle without blocking
    ///
    /// On a shut-down pool the item's handle is terminated with
    /// `Failure(Rejected)`, so its completion hooks still fire once.
    pub fn submit(&self, item: WorkItem) -> Result<TaskHandle, PoolError> {
        let handle = item.handle().clone();
        let current = self.current.read();

        let rejected = match current.as_ref() {
            Some(instance) => instance.send(item).err(),
            None => Some(item),
        };
        drop(current);

        match rejected {
            None => {
                debug!("Queued task {} ({})", handle.id(), handle.family());
                Ok(handle)
            }
            Some(item) => {
                warn!("Rejected task {}: pool is shut down", item.handle().id());
                item.handle().reject(WorkloadError::Rejected);
                Err(PoolError::ShutDown)
            }
        }
    }

    /// Replace the worker count for future submissions
    ///
    /// A size of 0 is normalised to 1. The previous generation keeps running
    /// what it already holds.
    pub fn resize(&self, size: usize) -> Result<(), PoolError> {
        let config = PoolConfig::new(size);

        let generation = {
            let mut next = self.next_generation.lock();
            let generation = *next;
            *next += 1;
            generation
        };

        let mut current = self.current.write();
        if current.is_none() {
            return Err(PoolError::ShutDown);
        }
        let instance = PoolInstance::spawn(generation, config.size)?;
        let old = current.replace(instance);
        *self.config.lock() = config;
        drop(current);

        if let Some(mut old) = old {
            old.close();
            info!(
                "Resized pool from {} to {} workers (generation {} draining)",
                old.size, config.size, old.generation
            );
            let mut retired = self.retired.lock();
            retired.retain(|instance| !instance.is_drained());
            retired.push(old);
        }
        Ok(())
    }

    /// Stop accepting work and wait for every generation to drain
    ///
    /// Running and queued items are not interrupted; cancel their handles
    /// first to make them stop early.
    pub fn shutdown(&self) {
        let current = self.current.write().take();
        let retired: Vec<PoolInstance> = std::mem::take(&mut *self.retired.lock());

        if current.is_some() {
            info!("Shutting down worker pool");
        }
        for mut instance in current.into_iter().chain(retired) {
            instance.join();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.current.read().is_none()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
