use futures::FutureExt;
use mailroom_core::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Finished entries kept around for status queries before pruning.
const RETAINED_FINISHED: usize = 256;

pub type TaskId = Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Queued,
    Running,
    Succeeded(String),
    Failed(String),
    Cancelled,
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded(_) | TaskState::Failed(_) | TaskState::Cancelled
        )
    }
}

/// Observer for one submitted task.
pub struct TaskHandle {
    id: TaskId,
    label: String,
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Resolves with the terminal state.
    pub async fn wait(mut self) -> TaskState {
        let finished = self
            .state
            .wait_for(TaskState::is_finished)
            .await
            .map(|state| (*state).clone());
        match finished {
            Ok(state) => state,
            Err(_) => self.state.borrow().clone(),
        }
    }
}

struct Entry {
    state: Arc<watch::Sender<TaskState>>,
    abort: AbortHandle,
}

/// Bounded worker pool for fire-and-forget enrichment work. Each task's
/// progress is observable through a watch channel; cancelling one task
/// leaves the others running.
#[derive(Clone)]
pub struct TaskQueue {
    permits: Arc<Semaphore>,
    tasks: Arc<Mutex<HashMap<TaskId, Entry>>>,
}

/// Moves to `next` unless the task was already cancelled.
fn advance(state: &watch::Sender<TaskState>, next: TaskState) {
    state.send_if_modified(|current| {
        if *current == TaskState::Cancelled {
            false
        } else {
            *current = next;
            true
        }
    });
}

impl TaskQueue {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, Entry>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues `work`; it starts once a permit is free. The `Ok` string is
    /// kept as the task's success detail.
    pub fn submit<F>(&self, label: impl Into<String>, work: F) -> TaskHandle
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let label = label.into();
        let (sender, receiver) = watch::channel(TaskState::Queued);
        let state = Arc::new(sender);

        let permits = self.permits.clone();
        let task_state = state.clone();
        let task_label = label.clone();
        let join = tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                advance(&task_state, TaskState::Failed("queue closed".into()));
                return;
            };
            advance(&task_state, TaskState::Running);
            debug!("Task {} started", task_label);

            let next = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(detail)) => TaskState::Succeeded(detail),
                Ok(Err(e)) => {
                    warn!("Task {} failed: {}", task_label, e);
                    TaskState::Failed(e.to_string())
                }
                Err(_) => {
                    warn!("Task {} panicked", task_label);
                    TaskState::Failed("task panicked".into())
                }
            };
            advance(&task_state, next);
        });

        let mut tasks = self.tasks();
        if tasks.len() > RETAINED_FINISHED {
            tasks.retain(|_, entry| !entry.state.borrow().is_finished());
        }
        tasks.insert(
            id,
            Entry {
                state,
                abort: join.abort_handle(),
            },
        );

        TaskHandle {
            id,
            label,
            state: receiver,
        }
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks().get(&id).map(|entry| entry.state.borrow().clone())
    }

    /// Aborts one unfinished task. Returns `false` if it already finished
    /// or is unknown.
    pub fn cancel(&self, id: TaskId) -> bool {
        let tasks = self.tasks();
        let Some(entry) = tasks.get(&id) else {
            return false;
        };

        let cancelled = entry.state.send_if_modified(|current| {
            if current.is_finished() {
                false
            } else {
                *current = TaskState::Cancelled;
                true
            }
        });
        if cancelled {
            entry.abort.abort();
        }
        cancelled
    }

    pub fn pending(&self) -> usize {
        self.tasks()
            .values()
            .filter(|entry| !entry.state.borrow().is_finished())
            .count()
    }

    /// Waits until every task submitted so far, and any submitted while
    /// waiting, has finished.
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<watch::Receiver<TaskState>> = self
                .tasks()
                .values()
                .filter(|entry| !entry.state.borrow().is_finished())
                .map(|entry| entry.state.subscribe())
                .collect();
            if pending.is_empty() {
                return;
            }
            for mut receiver in pending {
                let _ = receiver.wait_for(TaskState::is_finished).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailroom_core::error::MailroomError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn reports_success_and_failure() {
        let queue = TaskQueue::new(2);
        let ok = queue.submit("ok", async { Ok("done".to_string()) });
        let bad = queue.submit("bad", async { Err(MailroomError::Internal("boom".into())) });

        assert_eq!(ok.wait().await, TaskState::Succeeded("done".into()));
        assert!(matches!(bad.wait().await, TaskState::Failed(msg) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let queue = TaskQueue::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            queue.submit(format!("job-{}", i), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(String::new())
            });
        }

        queue.wait_idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn cancel_affects_only_that_task() {
        let queue = TaskQueue::new(4);
        let slow = queue.submit("slow", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("never".to_string())
        });
        let quick = queue.submit("quick", async { Ok("fine".to_string()) });

        assert!(queue.cancel(slow.id()));
        assert!(!queue.cancel(slow.id()));
        assert_eq!(slow.wait().await, TaskState::Cancelled);
        assert_eq!(quick.wait().await, TaskState::Succeeded("fine".into()));
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let queue = TaskQueue::new(1);
        let handle = queue.submit("panics", async {
            if true {
                panic!("bad input");
            }
            Ok(String::new())
        });
        let id = handle.id();
        assert_eq!(handle.wait().await, TaskState::Failed("task panicked".into()));
        assert_eq!(queue.state(id), Some(TaskState::Failed("task panicked".into())));
    }
}
