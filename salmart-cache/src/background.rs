//! Tracking of fire-and-forget reconciliation tasks.

use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinHandle;

/// Spawned background work.
///
/// Tasks are never cancelled; they run to completion or failure.
/// [`BackgroundTasks::settle`] waits for every task spawned so far,
/// including tasks spawned by the tasks it is waiting on.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        if let Ok(mut handles) = self.handles.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
    }

    /// Number of tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.handles
            .lock()
            .map(|handles| handles.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Wait until no tracked task is running.
    pub async fn settle(&self) {
        loop {
            let drained: Vec<JoinHandle<()>> = match self.handles.lock() {
                Ok(mut handles) => handles.drain(..).collect(),
                Err(_) => return,
            };
            if drained.is_empty() {
                return;
            }
            for handle in drained {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Background task panicked");
                }
            }
        }
    }
}
