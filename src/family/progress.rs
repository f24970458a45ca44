//! Progress Aggregator
//!
//! Folds any number of busy flags into one "work in progress" flag.
//! Every source is a `watch` channel and always holds a value, so there is no
//! "not yet emitted" state: the first aggregate is the OR of the sources'
//! current values, and every upstream change triggers a recompute.

use futures::future::select_all;
use log::debug;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{EngineError, EngineResult};

struct Source {
    rx: watch::Receiver<bool>,
    latest: bool,
    open: bool,
}

/// Logical OR over N busy observables
pub struct ProgressAggregator {
    progress_rx: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ProgressAggregator {
    /// Start recombining `sources` on the current tokio runtime
    ///
    /// Fails with [`EngineError::NoRuntime`] outside a runtime context.
    pub fn spawn(sources: impl IntoIterator<Item = watch::Receiver<bool>>) -> EngineResult<Self> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        Ok(Self::spawn_on(&runtime, sources))
    }

    /// Start recombining `sources` on `runtime`
    pub fn spawn_on(
        runtime: &Handle,
        sources: impl IntoIterator<Item = watch::Receiver<bool>>,
    ) -> Self {
        let sources: Vec<Source> = sources
            .into_iter()
            .map(|mut rx| {
                let latest = *rx.borrow_and_update();
                Source {
                    rx,
                    latest,
                    open: true,
                }
            })
            .collect();

        let (progress_tx, progress_rx) = watch::channel(any_busy(&sources));
        let task = runtime.spawn(recombine(sources, progress_tx));

        Self { progress_rx, task }
    }

    /// Observe the aggregate flag
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.progress_rx.clone()
    }

    /// Last computed aggregate
    pub fn in_progress(&self) -> bool {
        *self.progress_rx.borrow()
    }
}

impl Drop for ProgressAggregator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn any_busy(sources: &[Source]) -> bool {
    sources.iter().any(|source| source.latest)
}

async fn recombine(mut sources: Vec<Source>, progress_tx: watch::Sender<bool>) {
    loop {
        let pending: Vec<_> = sources
            .iter_mut()
            .enumerate()
            .filter(|(_, source)| source.open)
            .map(|(index, source)| Box::pin(async move { (index, source.rx.changed().await) }))
            .collect();
        if pending.is_empty() {
            debug!("All busy sources closed, aggregator stopping");
            return;
        }

        let ((index, changed), _, rest) = select_all(pending).await;
        drop(rest);

        if changed.is_err() {
            // A closed source no longer contributes work
            sources[index].open = false;
            sources[index].latest = false;
        }
        for source in sources.iter_mut().filter(|source| source.open) {
            source.latest = *source.rx.borrow_and_update();
        }

        let busy = any_busy(&sources);
        progress_tx.send_if_modified(|current| {
            if *current != busy {
                *current = busy;
                true
            } else {
                false
            }
        });
    }
}
