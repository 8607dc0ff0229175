//! Core types for the healing cascade

use action_primitives::{Region, VisualFingerprint};
use healing_store::ManualOverride;
use healrun_core_types::{ApprovalId, HealingId, OrganizationId, ProjectId, RunId, TestId};
use serde::{Deserialize, Serialize};

use crate::strategies::HealingStrategy;

/// Alternative selector precomputed for a step when the test was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorCandidate {
    /// Selector to try on the live page
    pub selector: String,

    /// Strategy tag as written in the test definition (alias or canonical)
    pub strategy: String,

    /// Confidence score (0.0-1.0)
    pub confidence: f64,
}

impl SelectorCandidate {
    pub fn new(selector: impl Into<String>, strategy: impl Into<String>, confidence: f64) -> Self {
        Self {
            selector: selector.into(),
            strategy: strategy.into(),
            confidence,
        }
    }
}

/// Candidate that survived filtering, with its strategy resolved
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub selector: String,
    pub strategy: HealingStrategy,
    pub confidence: f64,
}

/// Interaction the failing step was performing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionKind {
    Click,
    Fill { value: String },
}

/// Where the failure happened
#[derive(Debug, Clone, PartialEq)]
pub struct HealContext {
    pub run_id: RunId,
    pub test_id: TestId,
    pub project_id: ProjectId,
    pub organization_id: OrganizationId,
    pub step_index: usize,
}

/// Heal request for one failure event
#[derive(Debug, Clone)]
pub struct HealRequest {
    /// Run / test / step the failure belongs to
    pub context: HealContext,

    /// Interaction to replay with a healed selector
    pub action: InteractionKind,

    /// Selector that failed
    pub original_selector: String,

    /// Alternative selectors from the test definition
    pub candidates: Vec<SelectorCandidate>,

    /// Stored visual fingerprint of the target element, if recorded
    pub fingerprint: Option<VisualFingerprint>,
}

/// Provenance of a successful heal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealedSelector {
    /// Selector (or visual descriptor) that worked
    pub selector: String,

    /// Selector that failed
    pub original_selector: String,

    /// Strategy that succeeded
    pub strategy: HealingStrategy,

    /// Confidence of the heal
    pub confidence: f64,

    /// Matched region when the heal came from the visual fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,

    /// Reviewer sign-off for heals that went through approval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_override: Option<ManualOverride>,

    /// Record stored for later promotion into the test definition
    pub healing_id: HealingId,
}

/// Heal outcome enumeration
#[derive(Debug, Clone, PartialEq)]
pub enum HealOutcome {
    /// Interaction succeeded with a substitute selector
    Healed(HealedSelector),

    /// No candidate succeeded and no usable visual match
    Exhausted {
        /// Selectors attempted on the live page, in order
        attempted: Vec<String>,
    },

    /// Low-confidence visual match was rejected or timed out
    Rejected {
        approval_id: ApprovalId,
    },
}

impl HealOutcome {
    pub fn healed(&self) -> Option<&HealedSelector> {
        match self {
            HealOutcome::Healed(healed) => Some(healed),
            _ => None,
        }
    }

    pub fn is_healed(&self) -> bool {
        self.healed().is_some()
    }
}
