//! Built-in periodic tasks.
//!
//! Each task is registered under a stable name in [`builtin_registry`];
//! the scheduler constructs them at startup with the shared database and
//! application context.

mod heartbeat;
mod library_stats;
mod thumbnail_sweep;

pub use heartbeat::HeartbeatTask;
pub use library_stats::LibraryStatsTask;
pub use thumbnail_sweep::ThumbnailSweepTask;

use std::sync::Arc;

use archiva_scheduler::{Result, TaskRegistry};

/// The daemon's task table. Adding a task means adding a line here.
pub fn builtin_registry() -> Result<TaskRegistry> {
    let mut registry = TaskRegistry::new();
    registry.register("heartbeat", |ctx| Ok(Arc::new(HeartbeatTask::new(ctx))))?;
    registry.register("library-stats", |ctx| {
        Ok(Arc::new(LibraryStatsTask::new(ctx)))
    })?;
    registry.register("thumbnail-sweep", |ctx| {
        Ok(Arc::new(ThumbnailSweepTask::new(ctx)))
    })?;
    Ok(registry)
}
