//! Fire-and-forget scheduling of pipeline runs

use futures::future::BoxFuture;
use tracing::debug;

/// Runs a task out-of-band; `schedule` must return without awaiting it
pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, task: BoxFuture<'static, ()>);
}

/// Spawns each task onto the ambient Tokio runtime.
///
/// Must be used from inside a runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, task: BoxFuture<'static, ()>) {
        debug!("Spawning background task");
        drop(tokio::spawn(task));
    }
}
