//! Bridge from the healing cascade to the human approval coordinator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use healing_approval::{ApprovalCoordinator, ApprovalRequest};
use healrun_core_types::ApprovalId;
use tracing::debug;

/// Decision returned for an escalated heal
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalDecision {
    pub approval_id: ApprovalId,
    pub approved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Suspends the caller until a reviewer decides (or the request expires)
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request_decision(&self, request: ApprovalRequest) -> ApprovalDecision;
}

#[async_trait]
impl ApprovalGate for ApprovalCoordinator {
    async fn request_decision(&self, request: ApprovalRequest) -> ApprovalDecision {
        let outcome = self.request_approval(request, None).await.outcome().await;
        let approved = outcome.is_approved();
        debug!(approval_id = %outcome.id, approved, "approval decision received");
        ApprovalDecision {
            approved,
            resolved_by: outcome.resolved_by,
            resolved_at: outcome.resolved_at,
            approval_id: outcome.id,
        }
    }
}
