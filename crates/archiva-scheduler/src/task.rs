use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use archiva_core::{AppContext, Database};

use crate::breaker::BreakerPolicy;

/// How the engine dispatches a task's occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPolicy {
    /// Runs inline on the control loop, only after every outstanding
    /// concurrent invocation has finished. Nothing else starts until it
    /// returns — a tick that never returns stalls the whole scheduler.
    Exclusive,
    /// Spawned as an independent Tokio task; the loop moves on immediately.
    Concurrent,
}

/// Common interface implemented by every recurring job.
///
/// Implementations must be `Send + Sync` so they can be stored in the
/// engine and, for concurrent tasks, driven from a spawned Tokio task.
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable name for this task, used in log lines and health output.
    ///
    /// Must match the name the constructor was registered under in
    /// [`TaskRegistry`](crate::registry::TaskRegistry).
    fn name(&self) -> &str;

    /// Run cadence. Fixed after construction; the engine advances
    /// `next_run` by exactly this much per occurrence (fixed-rate, not
    /// fixed-delay).
    fn interval(&self) -> Duration;

    /// Dispatch policy for this task.
    fn policy(&self) -> TaskPolicy {
        TaskPolicy::Concurrent
    }

    /// Per-task circuit-breaker tuning. `None` uses the engine defaults.
    fn retry_policy(&self) -> Option<BreakerPolicy> {
        None
    }

    /// Perform one occurrence of work. May suspend. Errors are logged by
    /// the engine and recorded against the task's breaker; the task is
    /// rescheduled either way.
    async fn tick(&self) -> anyhow::Result<()>;

    /// Short status line for the health surface. Must not block or
    /// suspend; the control loop never calls this.
    fn health_check(&self) -> String;

    /// Invoked exactly once, right after construction and before the task
    /// is first scheduled. Errors are logged; the task is scheduled anyway.
    fn on_register(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Invoked once during shutdown, before the engine waits for the
    /// running set to drain. Errors are logged and never block the drain.
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Collaborators injected into every task constructor.
#[derive(Clone)]
pub struct TaskContext {
    /// Name the constructor was registered under.
    pub name: String,
    /// Configured default run interval. Tasks may ignore it and report
    /// their own cadence from [`Task::interval`].
    pub interval: Duration,
    /// Shared database handle.
    pub db: Database,
    /// Shared application runtime context.
    pub app: Arc<AppContext>,
}
