use healrun_core_types::ApprovalId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    /// Unknown id, already resolved, or expired and cleaned up
    #[error("healing approval {0} not found or already resolved")]
    NotFound(ApprovalId),
}
