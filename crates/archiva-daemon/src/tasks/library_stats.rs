use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use archiva_scheduler::{Task, TaskContext};

#[derive(Debug, Clone, Copy)]
struct Stats {
    libraries: u64,
    items: u64,
    total_bytes: i64,
}

/// Periodically counts libraries and items and logs the totals. The last
/// snapshot backs the health line, so the health surface never touches the
/// database.
pub struct LibraryStatsTask {
    ctx: TaskContext,
    last: Mutex<Option<Stats>>,
}

impl LibraryStatsTask {
    pub fn new(ctx: TaskContext) -> Self {
        Self {
            ctx,
            last: Mutex::new(None),
        }
    }

    fn collect(&self) -> anyhow::Result<Stats> {
        let libraries = self.ctx.db.count("libraries")?;
        let items = self.ctx.db.count("library_items")?;
        let total_bytes = self.ctx.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COALESCE(SUM(file_size), 0) FROM library_items",
                [],
                |row| row.get::<_, i64>(0),
            )
        })?;
        Ok(Stats {
            libraries,
            items,
            total_bytes,
        })
    }
}

#[async_trait]
impl Task for LibraryStatsTask {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn interval(&self) -> Duration {
        self.ctx.interval
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let stats = self.collect()?;
        info!(
            task = %self.ctx.name,
            libraries = stats.libraries,
            items = stats.items,
            total_bytes = stats.total_bytes,
            "library stats collected"
        );
        *self.last.lock().expect("stats lock poisoned") = Some(stats);
        Ok(())
    }

    fn health_check(&self) -> String {
        match *self.last.lock().expect("stats lock poisoned") {
            Some(stats) => format!(
                "{} libraries, {} items ({} bytes)",
                stats.libraries, stats.items, stats.total_bytes
            ),
            None => "no scan yet".to_string(),
        }
    }

    fn on_register(&self) -> anyhow::Result<()> {
        // Warm the snapshot so the first health probe has real numbers.
        let stats = self.collect()?;
        *self.last.lock().expect("stats lock poisoned") = Some(stats);
        Ok(())
    }
}
