use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A constructor with this name is already registered.
    #[error("Duplicate task name: {name}")]
    DuplicateTask { name: String },

    /// The engine's control loop has exited; commands can no longer be served.
    #[error("Scheduler is not running")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
