use action_flow::FlowError;
use action_primitives::ActionError;
use healrun_core_types::{CoreError, RunId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("browser launch failed: {0}")]
    Launch(#[source] ActionError),
    #[error("run {0} has no tests")]
    EmptyRun(RunId),
    #[error("invalid test definition: {0}")]
    InvalidDefinition(#[from] FlowError),
    #[error("test executor panicked: {0}")]
    Panicked(String),
    #[error("run task aborted: {0}")]
    Aborted(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SchedulerError> for CoreError {
    fn from(value: SchedulerError) -> Self {
        CoreError::new(value.to_string())
    }
}

impl SchedulerError {
    pub fn wrap(err: CoreError) -> CoreError {
        CoreError::new(format!("scheduler error: {err}"))
    }
}
