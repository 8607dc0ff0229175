use std::fmt;

use chrono::{DateTime, Utc};
use healrun_core_types::{ApprovalId, HealingId, RunId, TestId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingRecordStatus {
    Pending,
    Applied,
    Dismissed,
}

impl fmt::Display for HealingRecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealingRecordStatus::Pending => "pending",
            HealingRecordStatus::Applied => "applied",
            HealingRecordStatus::Dismissed => "dismissed",
        };
        f.write_str(label)
    }
}

/// Human sign-off attached to a heal that went through the approval gate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub approval_id: ApprovalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    pub approved_at: DateTime<Utc>,
}

/// Input for recording a successful runtime heal.
#[derive(Clone, Debug, PartialEq)]
pub struct NewHeal {
    pub run_id: RunId,
    pub test_id: TestId,
    pub step_index: usize,
    pub original_selector: String,
    pub healed_selector: String,
    pub strategy: String,
    pub confidence: f64,
    pub manual_override: Option<ManualOverride>,
}

/// A successful heal waiting to be promoted into (or discarded from) the
/// permanent test definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealingRecord {
    pub id: HealingId,
    pub run_id: RunId,
    pub test_id: TestId,
    pub step_index: usize,
    pub original_selector: String,
    pub healed_selector: String,
    pub strategy: String,
    pub confidence: f64,
    pub status: HealingRecordStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_override: Option<ManualOverride>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

impl HealingRecord {
    pub(crate) fn from_heal(heal: NewHeal) -> Self {
        Self {
            id: HealingId::new(),
            run_id: heal.run_id,
            test_id: heal.test_id,
            step_index: heal.step_index,
            original_selector: heal.original_selector,
            healed_selector: heal.healed_selector,
            strategy: heal.strategy,
            confidence: heal.confidence,
            status: HealingRecordStatus::Pending,
            manual_override: heal.manual_override,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == HealingRecordStatus::Pending
    }
}
