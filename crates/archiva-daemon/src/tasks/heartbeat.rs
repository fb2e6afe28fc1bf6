use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use archiva_scheduler::{Task, TaskContext};

/// Liveness beacon: suspends briefly and writes one log line, exercising
/// the dispatch path end to end.
pub struct HeartbeatTask {
    ctx: TaskContext,
}

impl HeartbeatTask {
    pub fn new(ctx: TaskContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Task for HeartbeatTask {
    fn name(&self) -> &str {
        &self.ctx.name
    }

    fn interval(&self) -> Duration {
        self.ctx.interval
    }

    async fn tick(&self) -> anyhow::Result<()> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!(
            task = %self.ctx.name,
            uptime_secs = self.ctx.app.uptime_secs(),
            "heartbeat"
        );
        Ok(())
    }

    fn health_check(&self) -> String {
        "alive".to_string()
    }
}
