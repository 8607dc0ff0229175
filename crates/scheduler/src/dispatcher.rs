use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use action_flow::ExecutionContext;
use action_primitives::{BrowserHandle, BrowserLauncher};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use healrun_core_types::{Run, RunId, RunStatus};
use healrun_event_bus::{Channel, EventPublisher, RUN_COMPLETE};
use healrun_registry::{RunRegistry, RunStatusBoard};
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::SchedulerError;
use crate::executor::TestTypeExecutor;
use crate::metrics;
use crate::model::{
    final_status, DispatcherConfig, RunReport, RunRequest, TestDefinition, TestKind, TestResult,
    TestResultStatus,
};

/// Handle to a run executing on its own task
pub struct DispatchHandle {
    pub run_id: RunId,
    join: JoinHandle<Result<RunReport, SchedulerError>>,
}

impl DispatchHandle {
    pub async fn wait(self) -> Result<RunReport, SchedulerError> {
        self.join
            .await
            .map_err(|err| SchedulerError::Aborted(err.to_string()))?
    }
}

/// Starts runs: one browser session and one sequential test stream per run,
/// many runs side by side. The browser is always closed and the run's
/// concurrency state released, whichever way the run ends.
pub struct RunDispatcher {
    launcher: Arc<dyn BrowserLauncher>,
    registry: Arc<RunRegistry>,
    board: Arc<RunStatusBoard>,
    publisher: Arc<dyn EventPublisher>,
    executors: HashMap<TestKind, Arc<dyn TestTypeExecutor>>,
    slots: Arc<Semaphore>,
}

impl RunDispatcher {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        registry: Arc<RunRegistry>,
        board: Arc<RunStatusBoard>,
        publisher: Arc<dyn EventPublisher>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            launcher,
            registry,
            board,
            publisher,
            executors: HashMap::new(),
            slots: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
        }
    }

    /// Register the executor for its test kind, replacing any previous one
    pub fn with_executor(mut self, executor: Arc<dyn TestTypeExecutor>) -> Self {
        self.executors.insert(executor.kind(), executor);
        self
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn status(&self, run: &RunId) -> Option<RunStatus> {
        self.board.get(run)
    }

    /// Request cooperative cancellation. Returns false for runs that
    /// already finished. A run not started yet never launches a browser.
    pub fn cancel(&self, run: &RunId) -> bool {
        let requested = self.board.request_cancel(run);
        if requested {
            self.registry.mark_cancelled(run);
            info!(target: "scheduler", run_id = %run, "cancellation requested");
        }
        requested
    }

    pub fn pause(&self, run: &RunId) -> bool {
        if self.board.get(run) != Some(RunStatus::Running) {
            return false;
        }
        if !self.board.transition(run, RunStatus::Paused) {
            return false;
        }
        self.registry.mark_paused(run);
        true
    }

    pub fn resume(&self, run: &RunId) -> bool {
        if self.board.get(run) != Some(RunStatus::Paused) {
            return false;
        }
        if !self.board.transition(run, RunStatus::Running) {
            return false;
        }
        self.registry.mark_resumed(run);
        true
    }

    /// Run on a dedicated task
    pub fn spawn(self: &Arc<Self>, request: RunRequest) -> DispatchHandle {
        let run_id = request.run.id.clone();
        self.board.transition(&run_id, RunStatus::Pending);
        let dispatcher = Arc::clone(self);
        let join = tokio::spawn(async move { dispatcher.run(request).await });
        DispatchHandle { run_id, join }
    }

    /// Execute a run to completion on the current task
    pub async fn run(&self, request: RunRequest) -> Result<RunReport, SchedulerError> {
        let RunRequest { run, tests } = request;
        if tests.is_empty() {
            self.board.set(&run.id, RunStatus::Error);
            return Err(SchedulerError::EmptyRun(run.id));
        }

        self.board.transition(&run.id, RunStatus::Pending);
        let _permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|err| SchedulerError::Internal(err.to_string()))?;
        metrics::record_started();
        let started_at = Utc::now();
        let started = Instant::now();
        if !self.board.transition(&run.id, RunStatus::Running) {
            info!(target: "scheduler", run_id = %run.id, "run cancelled before start");
            return Ok(self.finish(&run, Vec::new(), started_at, started).await);
        }
        let abandoned = AbandonedRunGuard {
            board: &self.board,
            run_id: &run.id,
        };
        info!(
            target: "scheduler",
            run_id = %run.id,
            browser = %run.browser,
            tests = tests.len(),
            "run started"
        );

        let browser = match self.launcher.launch(run.browser).await {
            Ok(browser) => browser,
            Err(err) => {
                warn!(target: "scheduler", run_id = %run.id, error = %err, "browser launch failed");
                self.board.set(&run.id, RunStatus::Error);
                metrics::record_finished(RunStatus::Error);
                return Err(SchedulerError::Launch(err));
            }
        };

        let registration = self.registry.register_scoped(&run.id, browser.clone());
        // Requests that landed between start and registration only reached the board.
        match self.board.get(&run.id) {
            Some(RunStatus::Cancelling) => self.registry.mark_cancelled(&run.id),
            Some(RunStatus::Paused) => self.registry.mark_paused(&run.id),
            _ => {}
        }
        let ctx = ExecutionContext {
            run_id: run.id.clone(),
            project_id: run.project_id.clone(),
            organization_id: run.organization_id.clone(),
        };
        let outcome = AssertUnwindSafe(self.run_tests(browser.as_ref(), &ctx, &tests))
            .catch_unwind()
            .await;
        registration.close().await;
        std::mem::forget(abandoned);

        match outcome {
            Ok(results) => Ok(self.finish(&run, results, started_at, started).await),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(target: "scheduler", run_id = %run.id, panic = %message, "test executor panicked");
                self.board.set(&run.id, RunStatus::Error);
                metrics::record_finished(RunStatus::Error);
                Err(SchedulerError::Panicked(message))
            }
        }
    }

    async fn run_tests(
        &self,
        browser: &dyn BrowserHandle,
        ctx: &ExecutionContext,
        tests: &[TestDefinition],
    ) -> Vec<TestResult> {
        let mut results = Vec::with_capacity(tests.len());
        for test in tests {
            if self.registry.is_cancelled(&ctx.run_id) {
                break;
            }
            let Some(executor) = self.executors.get(&test.kind) else {
                warn!(target: "scheduler", run_id = %ctx.run_id, test_id = %test.id, kind = %test.kind, "no executor for test kind");
                let mut skipped = TestResult::new(test, TestResultStatus::Skipped);
                skipped.error = Some(format!("no executor registered for {} tests", test.kind));
                results.push(skipped);
                continue;
            };
            let page = match browser.new_page().await {
                Ok(page) => page,
                Err(err) => {
                    warn!(target: "scheduler", run_id = %ctx.run_id, error = %err, "page creation failed");
                    results.push(TestResult::errored(test, err.to_string()));
                    break;
                }
            };
            let result = executor.execute(page.as_ref(), ctx, test).await;
            metrics::record_test_executed();
            info!(
                target: "scheduler",
                run_id = %ctx.run_id,
                test_id = %test.id,
                kind = %test.kind,
                status = ?result.status,
                duration_ms = result.duration_ms,
                "test completed"
            );
            let stop = result.status == TestResultStatus::Cancelled;
            results.push(result);
            if stop {
                break;
            }
        }
        results
    }

    async fn finish(
        &self,
        run: &Run,
        results: Vec<TestResult>,
        started_at: DateTime<Utc>,
        started: Instant,
    ) -> RunReport {
        let cancelled = self.board.get(&run.id) == Some(RunStatus::Cancelling);
        let status = final_status(&results, cancelled);
        self.board.set(&run.id, status);
        metrics::record_finished(status);

        let report = RunReport {
            run_id: run.id.clone(),
            status,
            results,
            started_at,
            completed_at: Utc::now(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            target: "scheduler",
            run_id = %run.id,
            status = %report.status,
            passed = report.count(TestResultStatus::Passed),
            failed = report.count(TestResultStatus::Failed),
            healed_steps = report.healed_steps(),
            duration_ms = report.duration_ms,
            "run finished"
        );

        let payload = json!({
            "run_id": report.run_id,
            "status": report.status,
            "tests": report.results.len(),
            "passed": report.count(TestResultStatus::Passed),
            "failed": report.count(TestResultStatus::Failed),
            "duration_ms": report.duration_ms,
        });
        for channel in [
            Channel::Run(run.id.clone()),
            Channel::Organization(run.organization_id.clone()),
        ] {
            if let Err(err) = self
                .publisher
                .publish(channel, RUN_COMPLETE, payload.clone())
                .await
            {
                warn!(target: "scheduler", run_id = %run.id, error = %err, "run-complete publish failed");
            }
        }
        report
    }
}

/// Marks a run `Error` when its future is dropped before reaching a
/// terminal status.
struct AbandonedRunGuard<'a> {
    board: &'a RunStatusBoard,
    run_id: &'a RunId,
}

impl Drop for AbandonedRunGuard<'_> {
    fn drop(&mut self) {
        if self.board.get(self.run_id).map_or(true, |status| !status.is_terminal()) {
            warn!(target: "scheduler", run_id = %self.run_id, "run abandoned before finishing");
            self.board.set(self.run_id, RunStatus::Error);
            metrics::record_finished(RunStatus::Error);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
