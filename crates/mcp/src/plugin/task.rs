// Cancellable periodic background tasks

use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a background task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A spawned loop that sleeps for `interval`, runs one unit of work, and
/// repeats until cancelled.
///
/// A failing or panicking cycle is logged and the loop carries on with the
/// next interval. Shutdown waits for an in-flight cycle to finish.
pub struct BackgroundTask {
    id: TaskId,
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub fn spawn_periodic<F, Fut>(name: impl Into<String>, interval: Duration, mut work: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = TaskId::new();
        let name = name.into();
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut cycle: u64 = 0;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                // Cancellation is only observed between cycles. `work()` runs
                // inside the guard so a synchronous panic is caught as well.
                cycle += 1;
                let outcome = AssertUnwindSafe(futures::future::lazy(|_| work()).flatten())
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(())) => tracing::trace!(task = %task_name, cycle, "Background cycle done"),
                    Ok(Err(e)) => {
                        tracing::error!(task = %task_name, cycle, "Background cycle failed: {:#}", e)
                    }
                    Err(_) => tracing::error!(task = %task_name, cycle, "Background cycle panicked"),
                }
            }
            tracing::debug!(task = %task_name, cycles = cycle, "Background task stopped");
        });

        tracing::debug!(task = %name, %id, ?interval, "Background task spawned");

        Self {
            id,
            name,
            cancel,
            handle,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal cancellation and wait for the loop to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(task = %self.name, "Background task ended abnormally: {}", e);
        }
    }
}

/// Handles of the tasks a plugin currently runs
#[derive(Default)]
pub struct TaskSet {
    tasks: HashMap<TaskId, BackgroundTask>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: BackgroundTask) -> TaskId {
        let id = task.id();
        self.tasks.insert(id, task);
        id
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every task and wait for all of them; the set is empty afterwards
    pub async fn shutdown_all(&mut self) {
        let tasks: Vec<_> = self.tasks.drain().map(|(_, task)| task).collect();
        futures::future::join_all(tasks.into_iter().map(BackgroundTask::shutdown)).await;
    }
}
