use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::warn;

/// Deferred snapshot publication.
pub type PublishTask = Box<dyn FnOnce() + Send + 'static>;

/// Runs snapshot publications handed over by a producer cycle.
///
/// Implementations may run the task later, on another thread, or drop it.
pub trait SnapshotPublishExecutor: Send + Sync {
    fn execute(&self, task: PublishTask);
}

/// Runs the task on the calling thread before the cycle continues.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl SnapshotPublishExecutor for InlineExecutor {
    fn execute(&self, task: PublishTask) {
        task();
    }
}

/// Runs every task on its own named thread.
#[derive(Debug)]
pub struct ThreadExecutor {
    context: String,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadExecutor {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Blocks until every task started so far has finished.
    pub fn wait(&self) {
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!(context = %self.context, "Snapshot publish thread panicked");
            }
        }
    }
}

impl SnapshotPublishExecutor for ThreadExecutor {
    fn execute(&self, task: PublishTask) {
        let name = thread_name(&self.context, "snapshot publish");
        // The task is shared with the fallback path in case the spawn fails.
        let slot = Arc::new(Mutex::new(Some(task)));
        let spawned_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let task = spawned_slot.lock().take();
            if let Some(task) = task {
                task();
            }
        });

        match spawned {
            Ok(handle) => {
                let mut handles = self.handles.lock();
                handles.retain(|handle| !handle.is_finished());
                handles.push(handle);
            }
            Err(err) => {
                warn!(thread = %name, error = %err, "Failed to spawn publish thread; running inline");
                let task = slot.lock().take();
                if let Some(task) = task {
                    task();
                }
            }
        }
    }
}

/// `blobrelay | <context> | <description>`
pub fn thread_name(context: &str, description: &str) -> String {
    format!("blobrelay | {context} | {description}")
}
