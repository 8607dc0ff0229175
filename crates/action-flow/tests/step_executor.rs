use std::sync::Arc;
use std::time::{Duration, Instant};

use action_flow::{
    ExecutionContext, ExecutorConfig, Step, StepAction, StepExecutor, StepStatus, TestScript,
    TestStatus,
};
use action_locator::{
    HealingPolicy, SelectorCandidate, SelectorHealingResolver, StaticPolicyProvider,
};
use action_primitives::scripted::{PageCall, ScriptedBrowser, ScriptedPage, ScriptedVisualMatcher};
use action_primitives::{
    ActionError, ArtifactRef, InteractOptions, NavigateOptions, PageDriver, Point,
    ScreenshotOptions,
};
use async_trait::async_trait;
use healing_approval::{ApprovalConfig, ApprovalCoordinator};
use healing_store::HealingStore;
use healrun_core_types::{BrowserType, OrganizationId, ProjectId, RunId, TestId};
use healrun_event_bus::{BusPublisher, NoopPublisher, STEP_COMPLETE, STEP_START, TEST_COMPLETE, TEST_START};
use healrun_registry::RunRegistry;

fn context(run: &str) -> ExecutionContext {
    ExecutionContext {
        run_id: RunId::from(run),
        project_id: ProjectId::from("proj"),
        organization_id: OrganizationId::from("org"),
    }
}

fn registered(run: &str) -> Arc<RunRegistry> {
    let registry = Arc::new(RunRegistry::new());
    registry.register(
        &RunId::from(run),
        Arc::new(ScriptedBrowser::new(BrowserType::Chromium, Default::default())),
    );
    registry
}

fn executor(registry: Arc<RunRegistry>) -> StepExecutor {
    StepExecutor::new(
        registry,
        Arc::new(NoopPublisher),
        ExecutorConfig::default().with_pause_poll(Duration::from_millis(5)),
    )
}

fn healer(store: Arc<HealingStore>) -> Arc<SelectorHealingResolver> {
    let coordinator = ApprovalCoordinator::new(ApprovalConfig::default(), Arc::new(NoopPublisher));
    Arc::new(SelectorHealingResolver::new(
        Arc::new(StaticPolicyProvider::new(HealingPolicy::default())),
        store,
        Arc::new(ScriptedVisualMatcher::default()),
        Arc::new(coordinator),
        Arc::new(NoopPublisher),
    ))
}

fn click(selector: &str) -> Step {
    Step::new(StepAction::Click {
        selector: selector.into(),
    })
}

fn five_clicks() -> TestScript {
    TestScript::new(
        TestId::from("five"),
        (1..=5).map(|n| click(&format!("#b{n}"))).collect(),
    )
}

fn page_with_buttons() -> ScriptedPage {
    (1..=5).fold(ScriptedPage::new(), |page, n| page.with_element(format!("#b{n}")))
}

/// Page that flips the run's cancel flag while a given selector is clicked.
struct CancellingPage {
    inner: ScriptedPage,
    registry: Arc<RunRegistry>,
    run_id: RunId,
    trigger: String,
}

#[async_trait]
impl PageDriver for CancellingPage {
    async fn navigate(&self, url: &str, opts: &NavigateOptions) -> Result<(), ActionError> {
        self.inner.navigate(url, opts).await
    }

    async fn click(&self, selector: &str, opts: &InteractOptions) -> Result<(), ActionError> {
        if selector == self.trigger {
            self.registry.mark_cancelled(&self.run_id);
        }
        self.inner.click(selector, opts).await
    }

    async fn fill(
        &self,
        selector: &str,
        value: &str,
        opts: &InteractOptions,
    ) -> Result<(), ActionError> {
        self.inner.fill(selector, value, opts).await
    }

    async fn click_at(&self, point: Point) -> Result<(), ActionError> {
        self.inner.click_at(point).await
    }

    async fn type_text(&self, value: &str) -> Result<(), ActionError> {
        self.inner.type_text(value).await
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        opts: &InteractOptions,
    ) -> Result<(), ActionError> {
        self.inner.wait_for_selector(selector, opts).await
    }

    async fn is_visible(
        &self,
        selector: &str,
        opts: &InteractOptions,
    ) -> Result<bool, ActionError> {
        self.inner.is_visible(selector, opts).await
    }

    async fn text_content(
        &self,
        selector: &str,
        opts: &InteractOptions,
    ) -> Result<Option<String>, ActionError> {
        self.inner.text_content(selector, opts).await
    }

    async fn current_url(&self) -> Result<String, ActionError> {
        self.inner.current_url().await
    }

    async fn screenshot(&self, opts: &ScreenshotOptions) -> Result<Vec<u8>, ActionError> {
        self.inner.screenshot(opts).await
    }

    async fn finalize_artifacts(&self) -> Result<Vec<ArtifactRef>, ActionError> {
        self.inner.finalize_artifacts().await
    }
}

#[tokio::test]
async fn passing_test_reports_every_step_and_events_in_order() {
    let publisher = Arc::new(BusPublisher::new(64));
    let mut events = publisher.subscribe();
    let executor = StepExecutor::new(
        registered("run-ok"),
        publisher.clone(),
        ExecutorConfig::default(),
    );
    let page = ScriptedPage::new()
        .with_element("#email")
        .with_element("#login")
        .with_text("h1", "Welcome back");
    let script = TestScript::new(
        TestId::from("login"),
        vec![
            Step::new(StepAction::Navigate {
                url: "https://app.test/login".into(),
            }),
            Step::new(StepAction::Fill {
                selector: "#email".into(),
                value: "qa@app.test".into(),
            }),
            click("#login"),
            Step::new(StepAction::AssertText {
                selector: "h1".into(),
                expected: "Welcome".into(),
                contains: true,
            }),
            Step::new(StepAction::AssertUrl {
                expected: "/login".into(),
                contains: true,
            }),
        ],
    );

    let execution = executor.execute(&page, &context("run-ok"), &script).await;
    assert_eq!(execution.status, TestStatus::Passed);
    assert_eq!(execution.steps.len(), 5);
    assert!(execution.steps.iter().all(|step| step.passed()));
    assert!(execution.error.is_none());
    assert_eq!(execution.artifacts.len(), 1);
    assert!(!page.calls().contains(&PageCall::Screenshot));
    assert_eq!(page.calls().last(), Some(&PageCall::Finalize));

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name);
    }
    assert_eq!(names.first().map(String::as_str), Some(TEST_START));
    assert_eq!(names.last().map(String::as_str), Some(TEST_COMPLETE));
    assert_eq!(names.iter().filter(|n| *n == STEP_START).count(), 5);
    assert_eq!(names.iter().filter(|n| *n == STEP_COMPLETE).count(), 5);
}

#[tokio::test]
async fn cancel_during_step_two_stops_before_step_three() {
    let run = RunId::from("run-cancel");
    let registry = registered(run.as_str());
    let page = CancellingPage {
        inner: page_with_buttons(),
        registry: registry.clone(),
        run_id: run.clone(),
        trigger: "#b2".into(),
    };

    let execution = executor(registry)
        .execute(&page, &context(run.as_str()), &five_clicks())
        .await;

    assert_eq!(execution.status, TestStatus::Cancelled);
    assert!(execution.steps.len() <= 3);
    assert_eq!(execution.steps.len(), 2);
    assert_eq!(page.inner.interacted_selectors(), vec!["#b1", "#b2"]);
    // Cleanup still runs for cancelled tests.
    assert_eq!(page.inner.calls().last(), Some(&PageCall::Finalize));
}

#[tokio::test]
async fn cancel_during_the_final_step_marks_the_test_cancelled() {
    let run = RunId::from("run-cancel-last");
    let registry = registered(run.as_str());
    let page = CancellingPage {
        inner: page_with_buttons(),
        registry: registry.clone(),
        run_id: run.clone(),
        trigger: "#b5".into(),
    };

    let execution = executor(registry)
        .execute(&page, &context(run.as_str()), &five_clicks())
        .await;

    assert_eq!(execution.status, TestStatus::Cancelled);
    assert_eq!(execution.steps.len(), 5);
    assert!(execution.steps.iter().all(|step| step.status == StepStatus::Passed));
    assert_eq!(page.inner.calls().last(), Some(&PageCall::Finalize));
}

#[tokio::test]
async fn cancelled_status_on_the_board_stops_before_the_first_step() {
    let board = Arc::new(healrun_registry::RunStatusBoard::new());
    let run = RunId::from("run-board");
    board.set(&run, healrun_core_types::RunStatus::Running);
    assert!(board.request_cancel(&run));
    let registry = Arc::new(RunRegistry::with_status_source(board));

    let page = page_with_buttons();
    let execution = executor(registry)
        .execute(&page, &context(run.as_str()), &five_clicks())
        .await;
    assert_eq!(execution.status, TestStatus::Cancelled);
    assert!(execution.steps.is_empty());
    assert!(page.interacted_selectors().is_empty());
}

#[tokio::test]
async fn paused_run_blocks_until_resumed() {
    let run = RunId::from("run-pause");
    let registry = registered(run.as_str());
    registry.mark_paused(&run);

    let resumer = {
        let registry = registry.clone();
        let run = run.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            registry.mark_resumed(&run);
        })
    };

    let page = page_with_buttons();
    let started = Instant::now();
    let execution = executor(registry)
        .execute(&page, &context(run.as_str()), &five_clicks())
        .await;
    resumer.await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(35));
    assert_eq!(execution.status, TestStatus::Passed);
    assert_eq!(execution.steps.len(), 5);
}

#[tokio::test]
async fn first_failure_short_circuits_and_still_cleans_up() {
    let page = ScriptedPage::new().with_element("#b1").with_element("#b3");
    let script = TestScript::new(
        TestId::from("broken"),
        vec![click("#b1"), click("#missing"), click("#b3")],
    );

    let execution = executor(registered("run-fail"))
        .execute(&page, &context("run-fail"), &script)
        .await;

    assert_eq!(execution.status, TestStatus::Failed);
    assert_eq!(execution.steps.len(), 2);
    assert_eq!(execution.steps[1].status, StepStatus::Failed);
    assert_eq!(
        execution.error.as_deref(),
        Some("Element not found: #missing")
    );
    assert_eq!(page.interacted_selectors(), vec!["#b1"]);

    let calls = page.calls();
    assert!(calls.contains(&PageCall::Screenshot));
    assert_eq!(calls.last(), Some(&PageCall::Finalize));
    assert_eq!(execution.screenshots.len(), 1);
    assert_eq!(execution.screenshots[0].step_index, Some(1));
}

#[tokio::test]
async fn missing_element_is_healed_with_full_provenance() {
    let (store, definitions) = HealingStore::in_memory();
    let store = Arc::new(store);
    definitions.insert(TestId::from("checkout"), vec![Some("#submit".into())]);

    let page = ScriptedPage::new().with_element("[data-testid=submit]");
    let script = TestScript::new(
        TestId::from("checkout"),
        vec![click("#submit").with_alternatives(vec![
            SelectorCandidate::new("#submit", "id", 1.0),
            SelectorCandidate::new("[data-testid=submit]", "data-testid", 0.92),
        ])],
    );

    let execution = executor(registered("run-heal"))
        .with_healer(healer(store.clone()))
        .execute(&page, &context("run-heal"), &script)
        .await;

    assert_eq!(execution.status, TestStatus::Passed);
    let step = &execution.steps[0];
    assert_eq!(step.selector.as_deref(), Some("[data-testid=submit]"));
    assert!(step.healing.was_healed);
    assert_eq!(step.healing.original_selector.as_deref(), Some("#submit"));
    assert_eq!(step.healing.strategy.as_deref(), Some("selector_fallback"));
    assert_eq!(step.healing.confidence, Some(0.92));
    assert!(!step.healing.manual_override);

    let healing_id = step.healing.healing_id.clone().unwrap();
    assert!(store.healing_record(&healing_id).is_some());
    assert_eq!(execution.healed_steps().count(), 1);
}

#[tokio::test]
async fn unrecovered_heal_surfaces_the_original_error() {
    let (store, _definitions) = HealingStore::in_memory();
    let page = ScriptedPage::new().with_element("[data-testid=pay]");
    let script = TestScript::new(
        TestId::from("pay"),
        vec![Step::new(StepAction::Fill {
            selector: "#card".into(),
            value: "4242".into(),
        })
        .with_alternatives(vec![SelectorCandidate::new(
            "[data-testid=pay]",
            "data-testid",
            0.5,
        )])],
    );

    let execution = executor(registered("run-unhealed"))
        .with_healer(healer(Arc::new(store)))
        .execute(&page, &context("run-unhealed"), &script)
        .await;

    assert_eq!(execution.status, TestStatus::Failed);
    assert_eq!(execution.error.as_deref(), Some("Element not found: #card"));
    assert!(!execution.steps[0].healing.was_healed);
    // The below-threshold candidate was never attempted.
    assert!(page.interacted_selectors().is_empty());
}

#[tokio::test]
async fn assertion_failures_are_not_healed() {
    let (store, _definitions) = HealingStore::in_memory();
    let store = Arc::new(store);
    let page = ScriptedPage::new().with_text("#total", "$10");
    let script = TestScript::new(
        TestId::from("totals"),
        vec![Step::new(StepAction::AssertText {
            selector: "#total".into(),
            expected: "$12".into(),
            contains: false,
        })
        .with_alternatives(vec![SelectorCandidate::new("#sum", "id", 0.99)])],
    );

    let execution = executor(registered("run-assert"))
        .with_healer(healer(store.clone()))
        .execute(&page, &context("run-assert"), &script)
        .await;

    assert_eq!(execution.status, TestStatus::Failed);
    assert!(execution
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Assertion failed")));
    assert_eq!(store.stats().total.attempts, 0);
}

#[tokio::test]
async fn screenshot_steps_are_collected() {
    let page = ScriptedPage::new();
    let script = TestScript::new(
        TestId::from("shots"),
        vec![
            Step::new(StepAction::Checkpoint {
                label: "before".into(),
            }),
            Step::new(StepAction::Screenshot {
                name: "landing".into(),
            }),
            Step::new(StepAction::Wait { ms: 1 }),
        ],
    );

    let execution = executor(registered("run-shots"))
        .execute(&page, &context("run-shots"), &script)
        .await;
    assert_eq!(execution.status, TestStatus::Passed);
    assert_eq!(execution.screenshots.len(), 1);
    assert_eq!(execution.screenshots[0].name, "landing");
    assert_eq!(execution.screenshots[0].step_index, Some(1));
}
