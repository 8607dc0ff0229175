//! Append-only audit log per (test, step)

use chrono::{DateTime, Utc};
use healrun_core_types::{ApprovalId, HealingId, RunId, TestId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::records::HealingRecord;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepKey {
    pub test_id: TestId,
    pub step_index: usize,
}

impl StepKey {
    pub fn new(test_id: TestId, step_index: usize) -> Self {
        Self {
            test_id,
            step_index,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    AutoHeal,
    ApprovedHeal,
    Revert,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectorHistoryEntry {
    pub id: String,
    pub test_id: TestId,
    pub step_index: usize,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_selector: Option<String>,
    pub strategy: String,
    pub confidence: f64,
    pub source: HistorySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healing_id: Option<HealingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub created_at: DateTime<Utc>,
    pub applied: bool,
    pub rejected: bool,
}

impl SelectorHistoryEntry {
    pub(crate) fn new(
        key: &StepKey,
        selector: impl Into<String>,
        previous_selector: Option<String>,
        strategy: impl Into<String>,
        confidence: f64,
        source: HistorySource,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            test_id: key.test_id.clone(),
            step_index: key.step_index,
            selector: selector.into(),
            previous_selector,
            strategy: strategy.into(),
            confidence,
            source,
            healing_id: None,
            run_id: None,
            created_at: Utc::now(),
            applied: false,
            rejected: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingEventOutcome {
    Healed,
    Failed,
    Rejected,
}

/// One healing attempt as observed at runtime, successful or not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealingEventEntry {
    pub id: String,
    pub run_id: RunId,
    pub test_id: TestId,
    pub step_index: usize,
    pub original_selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healed_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub outcome: HealingEventOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<ApprovalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healing_id: Option<HealingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub applied: bool,
    pub rejected: bool,
}

impl HealingEventEntry {
    fn new(
        run_id: RunId,
        test_id: TestId,
        step_index: usize,
        original_selector: String,
        outcome: HealingEventOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id,
            test_id,
            step_index,
            original_selector,
            healed_selector: None,
            strategy: None,
            confidence: None,
            outcome,
            approval_id: None,
            healing_id: None,
            detail: None,
            created_at: Utc::now(),
            applied: false,
            rejected: false,
        }
    }

    pub fn failed(
        run_id: RunId,
        test_id: TestId,
        step_index: usize,
        original_selector: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::new(
                run_id,
                test_id,
                step_index,
                original_selector.into(),
                HealingEventOutcome::Failed,
            )
        }
    }

    /// Successful heal, linked to its record and to the approval that
    /// allowed it, if any
    pub fn healed(record: &HealingRecord) -> Self {
        Self {
            healed_selector: Some(record.healed_selector.clone()),
            strategy: Some(record.strategy.clone()),
            confidence: Some(record.confidence),
            healing_id: Some(record.id.clone()),
            approval_id: record
                .manual_override
                .as_ref()
                .map(|manual| manual.approval_id.clone()),
            ..Self::new(
                record.run_id.clone(),
                record.test_id.clone(),
                record.step_index,
                record.original_selector.clone(),
                HealingEventOutcome::Healed,
            )
        }
    }

    /// Low-confidence suggestion a reviewer turned down (or let time out)
    #[allow(clippy::too_many_arguments)]
    pub fn rejected_suggestion(
        run_id: RunId,
        test_id: TestId,
        step_index: usize,
        original_selector: impl Into<String>,
        suggested_selector: impl Into<String>,
        strategy: impl Into<String>,
        confidence: f64,
        approval_id: ApprovalId,
    ) -> Self {
        Self {
            healed_selector: Some(suggested_selector.into()),
            strategy: Some(strategy.into()),
            confidence: Some(confidence),
            approval_id: Some(approval_id),
            rejected: true,
            ..Self::new(
                run_id,
                test_id,
                step_index,
                original_selector.into(),
                HealingEventOutcome::Rejected,
            )
        }
    }
}
