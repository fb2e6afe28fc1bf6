use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use archiva_core::{AppContext, Database};

use crate::error::{Result, SchedulerError};
use crate::task::{Task, TaskContext};

/// Constructor for one task, registered under a stable name.
pub type TaskConstructor =
    Box<dyn Fn(TaskContext) -> anyhow::Result<Arc<dyn Task>> + Send + Sync>;

/// Collaborators shared by every constructed task.
#[derive(Clone)]
pub struct TaskDeps {
    pub db: Database,
    pub app: Arc<AppContext>,
    /// Default run interval handed to constructors via [`TaskContext`].
    pub default_interval: Duration,
}

/// Table of named task constructors.
///
/// This is the registration-based replacement for scanning a tasks folder
/// at startup: the host lists its tasks in code, and instantiation stays
/// best-effort — one bad constructor never takes down the rest.
pub struct TaskRegistry {
    builders: Vec<(String, TaskConstructor)>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            builders: Vec::new(),
        }
    }

    /// Register a constructor under `name`. Duplicate names are rejected so
    /// a later registration cannot silently shadow an earlier one.
    pub fn register<F>(&mut self, name: &str, constructor: F) -> Result<()>
    where
        F: Fn(TaskContext) -> anyhow::Result<Arc<dyn Task>> + Send + Sync + 'static,
    {
        if self.builders.iter().any(|(n, _)| n == name) {
            warn!(task = %name, "duplicate task registration rejected");
            return Err(SchedulerError::DuplicateTask {
                name: name.to_string(),
            });
        }
        self.builders.push((name.to_string(), Box::new(constructor)));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.iter().map(|(n, _)| n.as_str())
    }

    /// Construct every registered task with the shared collaborators.
    ///
    /// A failing constructor is logged and skipped; so is a task whose
    /// reported `name()` disagrees with its registration key.
    pub fn instantiate_all(&self, deps: &TaskDeps) -> Vec<Arc<dyn Task>> {
        let mut tasks: Vec<Arc<dyn Task>> = Vec::new();
        for (name, constructor) in &self.builders {
            let ctx = TaskContext {
                name: name.clone(),
                interval: deps.default_interval,
                db: deps.db.clone(),
                app: Arc::clone(&deps.app),
            };
            match constructor(ctx) {
                Ok(task) => {
                    if task.name() != name {
                        warn!(
                            registered = %name,
                            reported = %task.name(),
                            "task name does not match its registration; skipping"
                        );
                        continue;
                    }
                    info!(task = %name, "task constructed");
                    tasks.push(task);
                }
                Err(e) => {
                    error!(task = %name, "failed to construct task: {e:#}");
                }
            }
        }
        tasks
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
