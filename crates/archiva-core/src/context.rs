use chrono::{DateTime, Utc};

use crate::config::ArchivaConfig;

/// Shared runtime context handed to periodic tasks alongside the database
/// handle. Carries the loaded configuration and process start time; wrap in
/// an `Arc` and clone the pointer, not the struct.
#[derive(Debug)]
pub struct AppContext {
    pub config: ArchivaConfig,
    pub started_at: DateTime<Utc>,
}

impl AppContext {
    pub fn new(config: ArchivaConfig) -> Self {
        Self {
            config,
            started_at: Utc::now(),
        }
    }

    /// Seconds since the daemon process came up.
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
