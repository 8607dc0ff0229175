//! Application wiring: builds the healing cascade, step executor and run
//! dispatcher from a [`Config`] and exposes them to the CLI commands.

use std::sync::Arc;

use action_flow::StepExecutor;
use action_locator::SelectorHealingResolver;
use action_primitives::scripted::{PageFixture, ScriptedLauncher, ScriptedVisualMatcher};
use action_primitives::{BrowserLauncher, VisualMatcher};
use healing_approval::{ApprovalCoordinator, ApprovalStatus, PendingHealingApproval};
use healing_store::{HealingStore, InMemoryDefinitionStore};
use healrun_event_bus::{BusPublisher, Channel, HEALING_APPROVAL_REQUIRED};
use healrun_registry::{RunRegistry, RunStatusBoard};
use healrun_scheduler::{
    ByteDiffComparator, E2eExecutor, InMemoryBaselineStore, RunDispatcher,
    VisualRegressionExecutor,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;

/// Name recorded as the resolver of approvals settled by a [`ReviewPolicy`]
pub const AUTOMATED_REVIEWER: &str = "healrun-cli";

/// How pending heal approvals are answered while a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReviewPolicy {
    Approve,
    Reject,
    /// Leave approvals to an external reviewer; unanswered ones time out
    #[default]
    Wait,
}

impl ReviewPolicy {
    fn decision(self) -> Option<bool> {
        match self {
            ReviewPolicy::Approve => Some(true),
            ReviewPolicy::Reject => Some(false),
            ReviewPolicy::Wait => None,
        }
    }
}

/// The orchestration core assembled around one event bus
pub struct HealrunApp {
    publisher: Arc<BusPublisher>,
    registry: Arc<RunRegistry>,
    store: Arc<HealingStore>,
    definitions: Arc<InMemoryDefinitionStore>,
    approvals: ApprovalCoordinator,
    dispatcher: Arc<RunDispatcher>,
}

impl HealrunApp {
    pub fn new(
        config: &Config,
        launcher: Arc<dyn BrowserLauncher>,
        visual: Arc<dyn VisualMatcher>,
    ) -> Self {
        let publisher = Arc::new(BusPublisher::new(config.events.bus_capacity));
        let board = Arc::new(RunStatusBoard::new());
        let registry = Arc::new(RunRegistry::with_status_source(board.clone()));

        let definitions = Arc::new(InMemoryDefinitionStore::new());
        let store = Arc::new(HealingStore::new(definitions.clone()));
        let approvals = ApprovalCoordinator::new(
            config.healing.approval_config(),
            publisher.clone(),
        );

        let executor_config = config.execution.executor_config();
        let resolver = SelectorHealingResolver::new(
            Arc::new(config.healing.policy_provider()),
            store.clone(),
            visual,
            Arc::new(approvals.clone()),
            publisher.clone(),
        )
        .with_interaction_timeout(executor_config.interaction_timeout);
        let navigation_timeout = executor_config.navigation_timeout;
        let steps = StepExecutor::new(registry.clone(), publisher.clone(), executor_config)
            .with_healer(Arc::new(resolver));

        let dispatcher = RunDispatcher::new(
            launcher,
            registry.clone(),
            board,
            publisher.clone(),
            config.execution.dispatcher_config(),
        )
        .with_executor(Arc::new(E2eExecutor::new(Arc::new(steps))))
        .with_executor(Arc::new(
            VisualRegressionExecutor::new(
                Arc::new(ByteDiffComparator),
                Arc::new(InMemoryBaselineStore::new()),
            )
            .with_navigation_timeout(navigation_timeout),
        ));

        info!(
            target: "healrun",
            threshold = config.healing.auto_heal_threshold,
            max_concurrent_runs = config.execution.max_concurrent_runs,
            "orchestration core ready"
        );

        Self {
            publisher,
            registry,
            store,
            definitions,
            approvals,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Core backed by the scripted driver serving `fixture`
    pub fn dry_run(config: &Config, fixture: &PageFixture) -> Self {
        Self::new(
            config,
            Arc::new(ScriptedLauncher::new(fixture.clone())),
            Arc::new(ScriptedVisualMatcher::new(fixture.visual_matches.clone())),
        )
    }

    pub fn dispatcher(&self) -> &Arc<RunDispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<HealingStore> {
        &self.store
    }

    pub fn definitions(&self) -> &Arc<InMemoryDefinitionStore> {
        &self.definitions
    }

    pub fn approvals(&self) -> &ApprovalCoordinator {
        &self.approvals
    }

    pub fn publisher(&self) -> &Arc<BusPublisher> {
        &self.publisher
    }

    /// Answer approval requests as they are published. Returns `None` for
    /// [`ReviewPolicy::Wait`]. The task ends when the bus closes or the
    /// handle is aborted.
    pub fn spawn_reviewer(&self, policy: ReviewPolicy) -> Option<JoinHandle<()>> {
        let approve = policy.decision()?;
        let mut events = self.publisher.subscribe();
        let approvals = self.approvals.clone();
        Some(tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "healrun", skipped, "reviewer lagged behind the event bus");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                // Each request is published on both channels; answer it once.
                if event.name != HEALING_APPROVAL_REQUIRED
                    || !matches!(event.channel, Channel::Run(_))
                {
                    continue;
                }
                let approval: PendingHealingApproval = match serde_json::from_value(event.payload)
                {
                    Ok(approval) => approval,
                    Err(err) => {
                        warn!(target: "healrun", error = %err, "unreadable approval payload");
                        continue;
                    }
                };
                if approval.status != ApprovalStatus::Pending {
                    continue;
                }
                match approvals
                    .resolve(&approval.id, approve, AUTOMATED_REVIEWER)
                    .await
                {
                    Ok(resolved) => info!(
                        target: "healrun",
                        approval_id = %resolved.id,
                        approved = approve,
                        suggested = %resolved.suggested_selector,
                        "approval answered"
                    ),
                    Err(err) => debug!(target: "healrun", error = %err, "approval no longer pending"),
                }
            }
        }))
    }

    /// Log every bus event at debug level until the bus closes
    pub fn spawn_event_log(&self) -> JoinHandle<()> {
        let mut events = self.publisher.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => debug!(
                        target: "healrun::events",
                        channel = %event.channel,
                        event = %event.name,
                        payload = %event.payload,
                        "event"
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(target: "healrun::events", skipped, "event log lagged")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
