use healrun_core_types::{HealingId, TestId};
use thiserror::Error;

use crate::records::HealingRecordStatus;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HealingStoreError {
    #[error("healing record {0} not found")]
    NotFound(HealingId),

    #[error("healing record {id} is already {status}")]
    AlreadyResolved {
        id: HealingId,
        status: HealingRecordStatus,
    },

    #[error("test definition {0} not found")]
    DefinitionNotFound(TestId),

    #[error("step index {index} is out of range for test {test_id} ({len} steps)")]
    InvalidStepIndex {
        test_id: TestId,
        index: usize,
        len: usize,
    },

    #[error("step {index} of test {test_id} has no selector")]
    StepWithoutSelector { test_id: TestId, index: usize },

    #[error("selector history entry {0} not found")]
    HistoryEntryNotFound(String),

    #[error("selector history entry {0} has no previous selector to restore")]
    NothingToRevert(String),
}
