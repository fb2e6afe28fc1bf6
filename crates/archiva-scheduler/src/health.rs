use std::fmt;

use chrono::{DateTime, Utc};

use crate::breaker::BreakerState;

/// One task's health line.
#[derive(Debug, Clone)]
pub struct TaskHealth {
    pub name: String,
    /// Whatever the task's `health_check` returned.
    pub status: String,
    pub breaker: BreakerState,
}

/// Advisory view of one outstanding concurrent invocation.
#[derive(Debug, Clone)]
pub struct RunningTask {
    pub name: String,
    pub started_at: DateTime<Utc>,
    /// Completion flag sampled at snapshot time; races with self-removal.
    pub finished: bool,
}

/// Aggregated scheduler health, rendered as the daemon's plain-text status.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub tasks: Vec<TaskHealth>,
    pub running: Vec<RunningTask>,
}

impl HealthReport {
    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for task in &self.tasks {
            write!(f, "{}: {}", task.name, task.status)?;
            if task.breaker != BreakerState::Closed {
                write!(f, " [breaker {}]", task.breaker)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Running tasks: {}", self.running.len())?;
        for inv in &self.running {
            writeln!(
                f,
                "Running task: {} State: {}",
                inv.name,
                if inv.finished { "Done" } else { "Running" }
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_task_lines_and_running_count() {
        let report = HealthReport {
            tasks: vec![
                TaskHealth {
                    name: "library-stats".into(),
                    status: "ok".into(),
                    breaker: BreakerState::Closed,
                },
                TaskHealth {
                    name: "thumbnail-sweep".into(),
                    status: "idle".into(),
                    breaker: BreakerState::Open,
                },
            ],
            running: vec![RunningTask {
                name: "library-stats".into(),
                started_at: Utc::now(),
                finished: false,
            }],
        };

        let text = report.to_string();
        assert!(text.contains("library-stats: ok"));
        assert!(text.contains("thumbnail-sweep: idle [breaker open]"));
        assert!(text.contains("Running tasks: 1"));
        assert!(text.contains("Running task: library-stats State: Running"));
    }

    #[test]
    fn empty_report_still_shows_running_count() {
        let report = HealthReport {
            tasks: vec![],
            running: vec![],
        };
        assert_eq!(report.to_string(), "Running tasks: 0\n");
        assert_eq!(report.running_count(), 0);
    }
}
