use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5800;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Run cadence handed to tasks that do not configure their own.
pub const DEFAULT_RUN_INTERVAL_SECS: u64 = 10;
/// Scheduler poll cadence between dispatch cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// Top-level config (archiva.toml + ARCHIVA_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivaConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for ArchivaConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Bind address for the health/status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Knobs consumed by the scheduling engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Default run interval for tasks that do not override it (seconds).
    #[serde(default = "default_run_interval")]
    pub default_interval_secs: u64,
    /// Dispatch-cycle poll cadence (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Consecutive tick failures before a task's breaker opens.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_failure_threshold: u32,
    /// Seconds a tripped breaker stays open before a trial run is allowed.
    #[serde(default = "default_breaker_cooldown")]
    pub breaker_cooldown_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_run_interval(),
            poll_interval_secs: default_poll_interval(),
            breaker_failure_threshold: default_breaker_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.archiva/archiva.db", home)
}
fn default_run_interval() -> u64 {
    DEFAULT_RUN_INTERVAL_SECS
}
fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_breaker_threshold() -> u32 {
    5
}
fn default_breaker_cooldown() -> u64 {
    60
}

impl ArchivaConfig {
    /// Load config from a TOML file with ARCHIVA_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.archiva/archiva.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ArchivaConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ARCHIVA_").split("_"))
            .extract()
            .map_err(|e| crate::error::ArchivaError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.archiva/archiva.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_daemon_constants() {
        let cfg = ArchivaConfig::default();
        assert_eq!(cfg.scheduler.default_interval_secs, 10);
        assert_eq!(cfg.scheduler.poll_interval_secs, 1);
        assert_eq!(cfg.http.port, DEFAULT_PORT);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let cfg = ArchivaConfig::load(Some("/nonexistent/archiva.toml")).unwrap();
        assert_eq!(cfg.scheduler.breaker_failure_threshold, 5);
        assert_eq!(cfg.scheduler.breaker_cooldown_secs, 60);
    }
}
