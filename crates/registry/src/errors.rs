use healrun_core_types::{CoreError, RunId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("run {0} is not registered")]
    NotRegistered(RunId),
}

impl RegistryError {
    pub fn into_core_error(self, detail: impl Into<String>) -> CoreError {
        let message = format!("{}: {}", self, detail.into());
        CoreError::new(message)
    }
}
