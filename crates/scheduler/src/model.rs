use std::fmt;
use std::time::Duration;

use action_flow::{Step, StepResult, TestExecution, TestScript, TestStatus};
use action_primitives::ArtifactRef;
use chrono::{DateTime, Utc};
use healrun_core_types::{Run, RunId, RunStatus, TestId};
use serde::{Deserialize, Serialize};

/// Test types the platform knows how to schedule
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    #[default]
    E2e,
    Visual,
    Lighthouse,
    Load,
    Accessibility,
}

impl TestKind {
    pub fn name(self) -> &'static str {
        match self {
            TestKind::E2e => "e2e",
            TestKind::Visual => "visual",
            TestKind::Lighthouse => "lighthouse",
            TestKind::Load => "load",
            TestKind::Accessibility => "accessibility",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_max_diff_ratio() -> f64 {
    0.01
}

/// Screenshot comparison settings of a visual test
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisualCheck {
    pub url: String,
    /// Key the baseline image is stored under
    pub baseline: String,
    /// Largest accepted fraction of differing pixels
    #[serde(default = "default_max_diff_ratio")]
    pub max_diff_ratio: f64,
    #[serde(default)]
    pub full_page: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestDefinition {
    pub id: TestId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: TestKind,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<VisualCheck>,
}

impl TestDefinition {
    pub fn e2e(id: impl Into<TestId>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind: TestKind::E2e,
            steps,
            visual: None,
        }
    }

    pub fn visual(id: impl Into<TestId>, check: VisualCheck) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind: TestKind::Visual,
            steps: Vec::new(),
            visual: Some(check),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn script(&self) -> TestScript {
        TestScript {
            test_id: self.id.clone(),
            name: self.name.clone(),
            steps: self.steps.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResultStatus {
    Passed,
    Failed,
    Cancelled,
    /// No executor is registered for the test's kind
    Skipped,
    /// The test could not be started (page creation, invalid definition)
    Error,
}

impl TestResultStatus {
    pub fn label(self) -> &'static str {
        match self {
            TestResultStatus::Passed => "passed",
            TestResultStatus::Failed => "failed",
            TestResultStatus::Cancelled => "cancelled",
            TestResultStatus::Skipped => "skipped",
            TestResultStatus::Error => "error",
        }
    }
}

impl fmt::Display for TestResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<TestStatus> for TestResultStatus {
    fn from(status: TestStatus) -> Self {
        match status {
            TestStatus::Passed => TestResultStatus::Passed,
            TestStatus::Failed => TestResultStatus::Failed,
            TestStatus::Cancelled => TestResultStatus::Cancelled,
        }
    }
}

/// Result shape shared by every test kind
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_id: TestId,
    pub name: String,
    pub kind: TestKind,
    pub status: TestResultStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepResult>,
    pub healed_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_ratio: Option<f64>,
    pub screenshots: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactRef>,
}

impl TestResult {
    pub fn new(test: &TestDefinition, status: TestResultStatus) -> Self {
        Self {
            test_id: test.id.clone(),
            name: test.name.clone(),
            kind: test.kind,
            status,
            duration_ms: 0,
            error: None,
            steps: Vec::new(),
            healed_steps: 0,
            diff_ratio: None,
            screenshots: 0,
            artifacts: Vec::new(),
        }
    }

    pub fn errored(test: &TestDefinition, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(test, TestResultStatus::Error)
        }
    }

    pub fn from_execution(test: &TestDefinition, execution: TestExecution) -> Self {
        Self {
            healed_steps: execution.healed_steps().count(),
            status: execution.status.into(),
            duration_ms: execution.duration_ms,
            error: execution.error,
            screenshots: execution.screenshots.len(),
            steps: execution.steps,
            artifacts: execution.artifacts,
            ..Self::new(test, TestResultStatus::Passed)
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}

/// A run plus the tests it executes, in order
#[derive(Clone, Debug, PartialEq)]
pub struct RunRequest {
    pub run: Run,
    pub tests: Vec<TestDefinition>,
}

impl RunRequest {
    pub fn new(run: Run, tests: Vec<TestDefinition>) -> Self {
        Self { run, tests }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub results: Vec<TestResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn count(&self, status: TestResultStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn healed_steps(&self) -> usize {
        self.results.iter().map(|r| r.healed_steps).sum()
    }
}

/// Terminal run status derived from the test results
pub(crate) fn final_status(results: &[TestResult], cancelled: bool) -> RunStatus {
    if cancelled
        || results
            .iter()
            .any(|r| r.status == TestResultStatus::Cancelled)
    {
        RunStatus::Cancelled
    } else if results.iter().any(|r| r.status == TestResultStatus::Error) {
        RunStatus::Error
    } else if results.iter().any(|r| r.status == TestResultStatus::Failed) {
        RunStatus::Failed
    } else {
        RunStatus::Passed
    }
}

/// Dispatcher limits
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Runs executing at once; further runs wait in `pending`
    pub max_concurrent_runs: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 8,
        }
    }
}
