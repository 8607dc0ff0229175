//! Step executor implementation

use std::sync::Arc;
use std::time::{Duration, Instant};

use action_locator::{HealContext, HealOutcome, HealRequest, InteractionKind, SelfHealer};
use action_primitives::{
    ActionError, ArtifactRef, InteractOptions, NavigateOptions, PageDriver, ScreenshotOptions,
};
use chrono::Utc;
use healrun_core_types::{OrganizationId, ProjectId, RunId};
use healrun_event_bus::{
    Channel, EventPublisher, STEP_COMPLETE, STEP_PROGRESS, STEP_START, TEST_COMPLETE, TEST_START,
};
use healrun_registry::{PauseOutcome, RunRegistry};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::*;

/// Timeouts and polling used by the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// How often a paused run re-checks its pause flag
    pub pause_poll: Duration,
    pub navigation_timeout: Duration,
    pub interaction_timeout: Duration,
    pub assertion_timeout: Duration,
    /// Capture a screenshot of the page when a test fails
    pub capture_failure_screenshot: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pause_poll: Duration::from_millis(1000),
            navigation_timeout: Duration::from_secs(30),
            interaction_timeout: Duration::from_secs(5),
            assertion_timeout: Duration::from_secs(5),
            capture_failure_screenshot: true,
        }
    }
}

impl ExecutorConfig {
    pub fn with_pause_poll(mut self, poll: Duration) -> Self {
        self.pause_poll = poll;
        self
    }
}

/// Run-level identity the executor needs for events and healing
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub run_id: RunId,
    pub project_id: ProjectId,
    pub organization_id: OrganizationId,
}

/// What a successful step produced
#[derive(Default)]
struct StepOutput {
    selector: Option<String>,
    healing: HealingMetadata,
    screenshot: Option<CapturedScreenshot>,
}

/// Executes one test's steps strictly in order against a single page.
///
/// The run registry is consulted at every step boundary: a cancelled run
/// stops before its next step and a paused run blocks there until resumed.
/// The first failed step ends the test; cleanup runs on every exit path.
pub struct StepExecutor {
    registry: Arc<RunRegistry>,
    healer: Option<Arc<dyn SelfHealer>>,
    publisher: Arc<dyn EventPublisher>,
    config: ExecutorConfig,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<RunRegistry>,
        publisher: Arc<dyn EventPublisher>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            registry,
            healer: None,
            publisher,
            config,
        }
    }

    /// Enable selector healing for element-missing click/fill failures
    pub fn with_healer(mut self, healer: Arc<dyn SelfHealer>) -> Self {
        self.healer = Some(healer);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        page: &dyn PageDriver,
        ctx: &ExecutionContext,
        script: &TestScript,
    ) -> TestExecution {
        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            target: "step-executor",
            run_id = %ctx.run_id,
            test_id = %script.test_id,
            steps = script.steps.len(),
            "test started"
        );
        self.emit(
            &ctx.run_id,
            TEST_START,
            json!({ "test_id": script.test_id, "name": script.name, "steps": script.steps.len() }),
        )
        .await;

        let mut steps = Vec::with_capacity(script.steps.len());
        let mut screenshots = Vec::new();
        let mut status = TestStatus::Passed;
        let mut error = None;

        for (index, step) in script.steps.iter().enumerate() {
            // One boundary check covers "after step N" and "before step N+1".
            if !self.checkpoint(&ctx.run_id).await {
                info!(
                    target: "step-executor",
                    run_id = %ctx.run_id,
                    test_id = %script.test_id,
                    next_step = index,
                    "run cancelled; remaining steps skipped"
                );
                status = TestStatus::Cancelled;
                break;
            }

            let (result, screenshot) = self.run_step(page, ctx, script, index, step).await;
            screenshots.extend(screenshot);
            let failed = !result.passed();
            if failed {
                error = result.error.clone();
            }
            steps.push(result);
            if failed {
                status = TestStatus::Failed;
                break;
            }
        }
        // Boundary after the final step.
        if status == TestStatus::Passed && !self.checkpoint(&ctx.run_id).await {
            info!(
                target: "step-executor",
                run_id = %ctx.run_id,
                test_id = %script.test_id,
                "run cancelled after the final step"
            );
            status = TestStatus::Cancelled;
        }

        let artifacts = self
            .cleanup(page, &ctx.run_id, status, steps.len(), &mut screenshots)
            .await;

        let execution = TestExecution {
            test_id: script.test_id.clone(),
            status,
            steps,
            error,
            screenshots,
            artifacts,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            target: "step-executor",
            run_id = %ctx.run_id,
            test_id = %execution.test_id,
            status = ?execution.status,
            executed = execution.steps.len(),
            healed = execution.healed_steps().count(),
            duration_ms = execution.duration_ms,
            "test finished"
        );
        self.emit(
            &ctx.run_id,
            TEST_COMPLETE,
            json!({
                "test_id": execution.test_id,
                "status": execution.status,
                "steps": execution.steps.len(),
                "error": execution.error,
                "duration_ms": execution.duration_ms,
            }),
        )
        .await;
        execution
    }

    /// `false` when the run has been cancelled, possibly while paused.
    async fn checkpoint(&self, run_id: &RunId) -> bool {
        if self.registry.is_cancelled(run_id) {
            return false;
        }
        self.registry
            .wait_while_paused(run_id, self.config.pause_poll)
            .await
            != PauseOutcome::Cancelled
    }

    async fn run_step(
        &self,
        page: &dyn PageDriver,
        ctx: &ExecutionContext,
        script: &TestScript,
        index: usize,
        step: &Step,
    ) -> (StepResult, Option<CapturedScreenshot>) {
        let started_at = Utc::now();
        let started = Instant::now();
        debug!(
            target: "step-executor",
            run_id = %ctx.run_id,
            step = index,
            action = step.action.name(),
            "step started"
        );
        self.emit(
            &ctx.run_id,
            STEP_START,
            json!({
                "test_id": script.test_id,
                "index": index,
                "action": step.action.name(),
                "selector": step.action.selector(),
                "description": step.description,
            }),
        )
        .await;

        let outcome = self.perform(page, ctx, script, index, step).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        let (result, screenshot) = match outcome {
            Ok(output) => (
                StepResult {
                    id: Uuid::new_v4().to_string(),
                    index,
                    action: step.action.name().to_string(),
                    selector: output
                        .selector
                        .or_else(|| step.action.selector().map(str::to_string)),
                    status: StepStatus::Passed,
                    duration_ms,
                    error: None,
                    healing: output.healing,
                    started_at,
                },
                output.screenshot,
            ),
            Err(err) => {
                warn!(
                    target: "step-executor",
                    run_id = %ctx.run_id,
                    test_id = %script.test_id,
                    step = index,
                    action = step.action.name(),
                    error = %err,
                    "step failed"
                );
                (
                    StepResult {
                        id: Uuid::new_v4().to_string(),
                        index,
                        action: step.action.name().to_string(),
                        selector: step.action.selector().map(str::to_string),
                        status: StepStatus::Failed,
                        duration_ms,
                        error: Some(err.to_string()),
                        healing: HealingMetadata::default(),
                        started_at,
                    },
                    None,
                )
            }
        };

        self.emit(
            &ctx.run_id,
            STEP_COMPLETE,
            json!({
                "test_id": script.test_id,
                "index": index,
                "status": result.status,
                "duration_ms": result.duration_ms,
                "error": result.error,
                "healing": result.healing,
            }),
        )
        .await;
        (result, screenshot)
    }

    async fn perform(
        &self,
        page: &dyn PageDriver,
        ctx: &ExecutionContext,
        script: &TestScript,
        index: usize,
        step: &Step,
    ) -> Result<StepOutput, ActionError> {
        let interact = InteractOptions::with_timeout(
            step.timeout().unwrap_or(self.config.interaction_timeout),
        );
        let assert = InteractOptions::with_timeout(
            step.timeout().unwrap_or(self.config.assertion_timeout),
        );

        match &step.action {
            StepAction::Navigate { url } => {
                let opts = NavigateOptions {
                    timeout: step.timeout().unwrap_or(self.config.navigation_timeout),
                    ..NavigateOptions::default()
                };
                page.navigate(url, &opts).await?;
                Ok(StepOutput::default())
            }
            StepAction::Click { selector } => {
                match page.click(selector, &interact).await {
                    Ok(()) => Ok(StepOutput::default()),
                    Err(err) => {
                        let action = InteractionKind::Click;
                        self.heal(page, ctx, script, index, step, action, selector, err)
                            .await
                    }
                }
            }
            StepAction::Fill { selector, value } => {
                match page.fill(selector, value, &interact).await {
                    Ok(()) => Ok(StepOutput::default()),
                    Err(err) => {
                        let action = InteractionKind::Fill {
                            value: value.clone(),
                        };
                        self.heal(page, ctx, script, index, step, action, selector, err)
                            .await
                    }
                }
            }
            StepAction::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(StepOutput::default())
            }
            StepAction::WaitForSelector { selector } => {
                page.wait_for_selector(selector, &assert).await?;
                Ok(StepOutput::default())
            }
            StepAction::AssertVisible { selector } => {
                if page.is_visible(selector, &assert).await? {
                    Ok(StepOutput::default())
                } else {
                    Err(ActionError::AssertionFailed(format!(
                        "{selector} is not visible"
                    )))
                }
            }
            StepAction::AssertText {
                selector,
                expected,
                contains,
            } => {
                let actual = page.text_content(selector, &assert).await?.unwrap_or_default();
                if matches_expected(&actual, expected, *contains) {
                    Ok(StepOutput::default())
                } else {
                    Err(ActionError::AssertionFailed(format!(
                        "text of {selector} was {actual:?}, expected {expected:?}"
                    )))
                }
            }
            StepAction::AssertUrl { expected, contains } => {
                let actual = page.current_url().await?;
                if matches_expected(&actual, expected, *contains) {
                    Ok(StepOutput::default())
                } else {
                    Err(ActionError::AssertionFailed(format!(
                        "url was {actual:?}, expected {expected:?}"
                    )))
                }
            }
            StepAction::Screenshot { name } => {
                let bytes = page.screenshot(&ScreenshotOptions::default()).await?;
                Ok(StepOutput {
                    screenshot: Some(CapturedScreenshot {
                        name: name.clone(),
                        step_index: Some(index),
                        size: bytes.len(),
                        bytes,
                    }),
                    ..StepOutput::default()
                })
            }
            StepAction::Checkpoint { label } => {
                self.emit(
                    &ctx.run_id,
                    STEP_PROGRESS,
                    json!({ "test_id": script.test_id, "index": index, "checkpoint": label }),
                )
                .await;
                Ok(StepOutput::default())
            }
        }
    }

    /// Run the healing cascade for a failed click/fill. Anything short of a
    /// healed outcome surfaces the original error.
    #[allow(clippy::too_many_arguments)]
    async fn heal(
        &self,
        page: &dyn PageDriver,
        ctx: &ExecutionContext,
        script: &TestScript,
        index: usize,
        step: &Step,
        action: InteractionKind,
        selector: &str,
        err: ActionError,
    ) -> Result<StepOutput, ActionError> {
        let Some(healer) = self.healer.as_ref() else {
            return Err(err);
        };
        if !err.is_element_missing() {
            return Err(err);
        }

        self.emit(
            &ctx.run_id,
            STEP_PROGRESS,
            json!({
                "test_id": script.test_id,
                "index": index,
                "phase": "healing",
                "selector": selector,
                "candidates": step.alternatives.len(),
            }),
        )
        .await;

        let request = HealRequest {
            context: HealContext {
                run_id: ctx.run_id.clone(),
                test_id: script.test_id.clone(),
                project_id: ctx.project_id.clone(),
                organization_id: ctx.organization_id.clone(),
                step_index: index,
            },
            action,
            original_selector: selector.to_string(),
            candidates: step.alternatives.clone(),
            fingerprint: step.fingerprint.clone(),
        };

        // The healer has already replayed the interaction on the live page.
        match healer.heal(page, request).await {
            Ok(HealOutcome::Healed(healed)) => Ok(StepOutput {
                selector: Some(healed.selector.clone()),
                healing: HealingMetadata::from(&healed),
                screenshot: None,
            }),
            Ok(outcome) => {
                debug!(target: "step-executor", step = index, ?outcome, "healing did not recover step");
                Err(err)
            }
            Err(heal_err) => {
                warn!(target: "step-executor", step = index, error = %heal_err, "healing aborted");
                Err(err)
            }
        }
    }

    /// Failure screenshot and artifact finalisation, whatever the outcome.
    async fn cleanup(
        &self,
        page: &dyn PageDriver,
        run_id: &RunId,
        status: TestStatus,
        executed: usize,
        screenshots: &mut Vec<CapturedScreenshot>,
    ) -> Vec<ArtifactRef> {
        if status == TestStatus::Failed && self.config.capture_failure_screenshot {
            match page.screenshot(&ScreenshotOptions { full_page: true }).await {
                Ok(bytes) => screenshots.push(CapturedScreenshot {
                    name: "failure".to_string(),
                    step_index: executed.checked_sub(1),
                    size: bytes.len(),
                    bytes,
                }),
                Err(err) => {
                    warn!(target: "step-executor", run_id = %run_id, error = %err, "failure screenshot not captured")
                }
            }
        }
        match page.finalize_artifacts().await {
            Ok(artifacts) => artifacts,
            Err(err) => {
                warn!(target: "step-executor", run_id = %run_id, error = %err, "artifact finalisation failed");
                Vec::new()
            }
        }
    }

    async fn emit(&self, run_id: &RunId, event: &str, payload: Value) {
        if let Err(err) = self
            .publisher
            .publish(Channel::Run(run_id.clone()), event, payload)
            .await
        {
            warn!(target: "step-executor", run_id = %run_id, event, error = %err, "event publish failed");
        }
    }
}

fn matches_expected(actual: &str, expected: &str, contains: bool) -> bool {
    if contains {
        actual.contains(expected)
    } else {
        actual.trim() == expected.trim()
    }
}
