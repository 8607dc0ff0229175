//! Errors raised while loading and validating configuration

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("healing.auto_heal_threshold must lie in [0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("healing.projects.{project}.auto_heal_threshold must lie in [0, 1], got {value}")]
    ProjectThresholdOutOfRange { project: String, value: f64 },

    #[error("execution.pause_poll_ms must be greater than zero")]
    ZeroPausePoll,

    #[error("healing.approval_timeout_secs must be greater than zero")]
    ZeroApprovalTimeout,

    #[error("events.bus_capacity must be greater than zero")]
    ZeroBusCapacity,

    #[error("execution.max_concurrent_runs must be greater than zero")]
    ZeroConcurrency,
}
