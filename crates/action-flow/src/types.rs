//! Core types for step execution

use std::time::Duration;

use action_locator::{HealedSelector, SelectorCandidate};
use action_primitives::{ArtifactRef, VisualFingerprint};
use chrono::{DateTime, Utc};
use healrun_core_types::{ApprovalId, HealingId, TestId};
use serde::{Deserialize, Serialize};

use crate::errors::FlowError;

/// What a step does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Load a URL
    Navigate { url: String },

    /// Click an element
    Click { selector: String },

    /// Type a value into an input
    Fill { selector: String, value: String },

    /// Sleep for a fixed time
    Wait { ms: u64 },

    /// Wait until an element is attached and visible
    WaitForSelector { selector: String },

    /// Element must be visible
    AssertVisible { selector: String },

    /// Element text must equal (or contain) the expected value
    AssertText {
        selector: String,
        expected: String,
        #[serde(default)]
        contains: bool,
    },

    /// Page URL must equal (or contain) the expected value
    AssertUrl {
        expected: String,
        #[serde(default)]
        contains: bool,
    },

    /// Capture a named screenshot
    Screenshot { name: String },

    /// Marker reported to subscribers, no page interaction
    Checkpoint { label: String },
}

impl StepAction {
    /// Get action name as string
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::Navigate { .. } => "navigate",
            StepAction::Click { .. } => "click",
            StepAction::Fill { .. } => "fill",
            StepAction::Wait { .. } => "wait",
            StepAction::WaitForSelector { .. } => "wait_for_selector",
            StepAction::AssertVisible { .. } => "assert_visible",
            StepAction::AssertText { .. } => "assert_text",
            StepAction::AssertUrl { .. } => "assert_url",
            StepAction::Screenshot { .. } => "screenshot",
            StepAction::Checkpoint { .. } => "checkpoint",
        }
    }

    /// Selector the step targets, if any
    pub fn selector(&self) -> Option<&str> {
        match self {
            StepAction::Click { selector }
            | StepAction::Fill { selector, .. }
            | StepAction::WaitForSelector { selector }
            | StepAction::AssertVisible { selector }
            | StepAction::AssertText { selector, .. } => Some(selector),
            _ => None,
        }
    }

    /// Click and fill are the only actions the healing cascade replays
    pub fn is_element_interaction(&self) -> bool {
        matches!(self, StepAction::Click { .. } | StepAction::Fill { .. })
    }
}

/// One step of a test definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: StepAction,

    /// Alternative selectors precomputed when the test was recorded
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<SelectorCandidate>,

    /// Visual fingerprint of the target element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<VisualFingerprint>,

    /// Overrides the executor's default budget for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Step {
    pub fn new(action: StepAction) -> Self {
        Self {
            action,
            alternatives: Vec::new(),
            fingerprint: None,
            timeout_ms: None,
            description: None,
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<SelectorCandidate>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: VisualFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Ordered steps of one end-to-end test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScript {
    pub test_id: TestId,
    #[serde(default)]
    pub name: String,
    pub steps: Vec<Step>,
}

impl TestScript {
    pub fn new(test_id: TestId, steps: Vec<Step>) -> Self {
        Self {
            test_id,
            name: String::new(),
            steps,
        }
    }

    /// Reject definitions the executor cannot run
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.steps.is_empty() {
            return Err(FlowError::EmptyTest(self.test_id.to_string()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            let reason = match &step.action {
                StepAction::Navigate { url } if url.trim().is_empty() => Some("empty url"),
                action if action.selector().is_some_and(|s| s.trim().is_empty()) => {
                    Some("empty selector")
                }
                _ => None,
            };
            if let Some(reason) = reason {
                return Err(FlowError::InvalidStep {
                    index,
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
}

/// Healing provenance recorded on a step result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealingMetadata {
    pub was_healed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healed_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healing_id: Option<HealingId>,
    pub manual_override: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<ApprovalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl From<&HealedSelector> for HealingMetadata {
    fn from(healed: &HealedSelector) -> Self {
        let manual = healed.manual_override.as_ref();
        Self {
            was_healed: true,
            original_selector: Some(healed.original_selector.clone()),
            healed_selector: Some(healed.selector.clone()),
            strategy: Some(healed.strategy.name().to_string()),
            confidence: Some(healed.confidence),
            healing_id: Some(healed.healing_id.clone()),
            manual_override: manual.is_some(),
            approval_id: manual.map(|m| m.approval_id.clone()),
            approved_by: manual.and_then(|m| m.approved_by.clone()),
            approved_at: manual.map(|m| m.approved_at),
        }
    }
}

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub id: String,
    pub index: usize,
    pub action: String,
    /// Selector actually used (the healed one when healing kicked in)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub healing: HealingMetadata,
    pub started_at: DateTime<Utc>,
}

impl StepResult {
    pub fn passed(&self) -> bool {
        self.status == StepStatus::Passed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Cancelled,
}

/// Screenshot taken by a step or by failure cleanup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedScreenshot {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub size: usize,
}

/// Result of running one test's step stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExecution {
    pub test_id: TestId,
    pub status: TestStatus,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub screenshots: Vec<CapturedScreenshot>,
    pub artifacts: Vec<ArtifactRef>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TestExecution {
    pub fn healed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|step| step.healing.was_healed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_parse_from_tagged_yaml_like_json() {
        let step: Step = serde_json::from_value(serde_json::json!({
            "type": "fill",
            "selector": "#email",
            "value": "a@b.c",
            "alternatives": [
                {"selector": "[name=email]", "strategy": "name", "confidence": 0.9}
            ],
            "timeout_ms": 1500
        }))
        .unwrap();
        assert_eq!(
            step.action,
            StepAction::Fill {
                selector: "#email".into(),
                value: "a@b.c".into()
            }
        );
        assert_eq!(step.alternatives.len(), 1);
        assert_eq!(step.timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn validation_rejects_empty_tests_and_selectors() {
        let empty = TestScript::new(TestId::from("t"), Vec::new());
        assert_eq!(empty.validate(), Err(FlowError::EmptyTest("t".into())));

        let blank = TestScript::new(
            TestId::from("t"),
            vec![
                Step::new(StepAction::Navigate {
                    url: "https://example.test".into(),
                }),
                Step::new(StepAction::Click {
                    selector: "  ".into(),
                }),
            ],
        );
        assert!(matches!(
            blank.validate(),
            Err(FlowError::InvalidStep { index: 1, .. })
        ));
    }
}
