use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::health::RunningTask;
use crate::queue::TaskId;

struct RunningEntry {
    task_id: TaskId,
    task_name: String,
    started_at: DateTime<Utc>,
    handle: Option<JoinHandle<()>>,
}

/// The set of outstanding concurrent invocations.
///
/// Mutated only by the control loop (`begin`/`attach`) and by each
/// invocation's completion handler (`finish`), which removes its own entry.
/// A watch channel publishes the current size so waiters get an explicit
/// drain event instead of polling.
pub struct RunningSet {
    inner: Mutex<HashMap<Uuid, RunningEntry>>,
    count_tx: watch::Sender<usize>,
}

impl RunningSet {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            count_tx: watch::Sender::new(0),
        }
    }

    /// Record the start of an invocation and return its identifier.
    pub(crate) fn begin(&self, task_id: TaskId, task_name: &str) -> Uuid {
        let invocation = Uuid::new_v4();
        let mut inner = self.inner.lock().expect("running set poisoned");
        inner.insert(
            invocation,
            RunningEntry {
                task_id,
                task_name: task_name.to_string(),
                started_at: Utc::now(),
                handle: None,
            },
        );
        self.count_tx.send_replace(inner.len());
        invocation
    }

    /// Attach the spawned handle to its entry. No-op if the invocation
    /// already finished in the window between spawn and attach.
    pub(crate) fn attach(&self, invocation: Uuid, handle: JoinHandle<()>) {
        let mut inner = self.inner.lock().expect("running set poisoned");
        if let Some(entry) = inner.get_mut(&invocation) {
            entry.handle = Some(handle);
        }
    }

    /// Remove a completed invocation. Called from the completion handler.
    pub(crate) fn finish(&self, invocation: Uuid) {
        let mut inner = self.inner.lock().expect("running set poisoned");
        inner.remove(&invocation);
        self.count_tx.send_replace(inner.len());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("running set poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any invocation of `task_id` is still outstanding.
    pub(crate) fn is_task_running(&self, task_id: TaskId) -> bool {
        self.inner
            .lock()
            .expect("running set poisoned")
            .values()
            .any(|e| e.task_id == task_id)
    }

    /// Wait until the set is empty. Resolves immediately if it already is.
    pub async fn drained(&self) {
        let mut rx = self.count_tx.subscribe();
        // wait_for checks the current value first, so an already-empty set
        // never blocks. Err is impossible while `self` holds the sender.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Advisory snapshot for health reporting. The finished flag races with
    /// self-removal: an entry may complete right after being captured.
    pub fn snapshot(&self) -> Vec<RunningTask> {
        self.inner
            .lock()
            .expect("running set poisoned")
            .values()
            .map(|e| RunningTask {
                name: e.task_name.clone(),
                started_at: e.started_at,
                finished: e.handle.as_ref().is_some_and(|h| h.is_finished()),
            })
            .collect()
    }
}

impl Default for RunningSet {
    fn default() -> Self {
        Self::new()
    }
}
