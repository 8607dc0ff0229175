use action_primitives::Region;
use chrono::{DateTime, Utc};
use healrun_core_types::{ApprovalId, OrganizationId, ProjectId, RunId, TestId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// What the resolver knows when it escalates a low-confidence heal.
#[derive(Clone, Debug, PartialEq)]
pub struct ApprovalRequest {
    pub run_id: RunId,
    pub test_id: TestId,
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub step_index: usize,
    pub original_selector: String,
    pub suggested_selector: String,
    pub strategy: String,
    pub confidence: f64,
    pub visual_region: Option<Region>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingHealingApproval {
    pub id: ApprovalId,
    pub run_id: RunId,
    pub test_id: TestId,
    pub organization_id: OrganizationId,
    pub project_id: ProjectId,
    pub step_index: usize,
    pub original_selector: String,
    pub suggested_selector: String,
    pub strategy: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_region: Option<Region>,
    pub status: ApprovalStatus,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// Rejected because nobody answered in time
    pub timed_out: bool,
}

impl PendingHealingApproval {
    pub(crate) fn open(request: ApprovalRequest, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: ApprovalId::new(),
            run_id: request.run_id,
            test_id: request.test_id,
            organization_id: request.organization_id,
            project_id: request.project_id,
            step_index: request.step_index,
            original_selector: request.original_selector,
            suggested_selector: request.suggested_selector,
            strategy: request.strategy,
            confidence: request.confidence,
            visual_region: request.visual_region,
            status: ApprovalStatus::Pending,
            requested_at: Utc::now(),
            expires_at,
            resolved_at: None,
            resolved_by: None,
            timed_out: false,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }
}
