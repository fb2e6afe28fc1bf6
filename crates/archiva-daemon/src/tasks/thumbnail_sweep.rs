use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use archiva_scheduler::{Task, TaskContext, TaskPolicy};

/// Minimum sweep cadence. Deleting while other tasks read is the reason
/// this task is exclusive, so it should not run more often than this.
const MIN_INTERVAL: Duration = Duration::from_secs(60);

/// Deletes thumbnail rows whose parent library item is gone.
///
/// Runs exclusively: the sweep mutates rows that the concurrent tasks
/// read, so the engine drains all in-flight work before each pass.
pub struct ThumbnailSweepTask {
    ctx: TaskContext,
    swept_total: AtomicU64,
}

impl ThumbnailSweepTask {
    pub fn new(ctx: TaskContext) -> Self {
        Self {
            ctx,
            swept_total: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Task for ThumbnailSweepTask {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn interval(&self) -> Duration {
        self.ctx.interval.max(MIN_INTERVAL)
    }

    fn policy(&self) -> TaskPolicy {
        TaskPolicy::Exclusive
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let removed = self.ctx.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM thumbnails
                 WHERE library_item_id IS NULL
                    OR library_item_id NOT IN (SELECT id FROM library_items)",
                [],
            )
        })?;

        if removed > 0 {
            self.swept_total
                .fetch_add(removed as u64, Ordering::Relaxed);
            info!(task = %self.ctx.name, removed, "orphaned thumbnails removed");
        } else {
            debug!(task = %self.ctx.name, "no orphaned thumbnails");
        }
        Ok(())
    }

    fn health_check(&self) -> String {
        format!(
            "{} orphans swept since start",
            self.swept_total.load(Ordering::Relaxed)
        )
    }

    async fn stop(&self) -> anyhow::Result<()> {
        info!(
            task = %self.ctx.name,
            total = self.swept_total.load(Ordering::Relaxed),
            "sweeper stopping"
        );
        Ok(())
    }
}
