//! Human-in-the-loop gate for low-confidence selector heals.

mod config;
mod coordinator;
mod errors;
mod model;

pub use config::{ApprovalConfig, DEFAULT_APPROVAL_TIMEOUT_SECS};
pub use coordinator::{ApprovalCoordinator, ApprovalHandle};
pub use errors::ApprovalError;
pub use model::{ApprovalRequest, ApprovalStatus, PendingHealingApproval};
