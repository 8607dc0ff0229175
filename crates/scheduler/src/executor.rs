use std::sync::Arc;
use std::time::Instant;

use action_flow::{ExecutionContext, StepExecutor};
use action_primitives::PageDriver;
use async_trait::async_trait;
use tracing::warn;

use crate::model::{TestDefinition, TestKind, TestResult};

/// Executes one kind of test against a fresh page and normalises the
/// outcome into a [`TestResult`]. Failures are reported in the result,
/// never returned as errors.
#[async_trait]
pub trait TestTypeExecutor: Send + Sync {
    fn kind(&self) -> TestKind;

    async fn execute(
        &self,
        page: &dyn PageDriver,
        ctx: &ExecutionContext,
        test: &TestDefinition,
    ) -> TestResult;
}

/// End-to-end tests: the step stream through [`StepExecutor`]
pub struct E2eExecutor {
    steps: Arc<StepExecutor>,
}

impl E2eExecutor {
    pub fn new(steps: Arc<StepExecutor>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl TestTypeExecutor for E2eExecutor {
    fn kind(&self) -> TestKind {
        TestKind::E2e
    }

    async fn execute(
        &self,
        page: &dyn PageDriver,
        ctx: &ExecutionContext,
        test: &TestDefinition,
    ) -> TestResult {
        let started = Instant::now();
        let script = test.script();
        if let Err(err) = script.validate() {
            warn!(target: "scheduler", test_id = %test.id, error = %err, "invalid e2e test");
            return TestResult::errored(test, err.to_string()).with_duration(started.elapsed());
        }
        let execution = self.steps.execute(page, ctx, &script).await;
        TestResult::from_execution(test, execution)
    }
}
