//! Selector healing cascade
//!
//! 1. rank the step's alternative selectors (filtered, descending confidence)
//! 2. replay the interaction with each candidate at or above the threshold,
//!    first success wins
//! 3. fall back to the visual matcher; apply confident matches directly and
//!    escalate low-confidence ones to a human reviewer

use std::sync::Arc;
use std::time::Duration;

use action_primitives::{
    ActionError, InteractOptions, PageDriver, Region, VisualFingerprint, VisualMatcher,
};
use async_trait::async_trait;
use chrono::Utc;
use healing_approval::ApprovalRequest;
use healing_store::{HealingEventEntry, HealingRecord, HealingStore, ManualOverride, NewHeal};
use healrun_core_types::ApprovalId;
use healrun_event_bus::{Channel, EventPublisher, HEALING_UPDATE_AVAILABLE};
use tracing::{debug, info, warn};

use crate::bridge::ApprovalGate;
use crate::errors::LocatorError;
use crate::healer::SelfHealer;
use crate::policy::{HealingPolicy, HealingPolicyProvider};
use crate::ranker::rank_candidates;
use crate::strategies::HealingStrategy;
use crate::types::{HealContext, HealOutcome, HealRequest, HealedSelector, InteractionKind};

/// Heal that worked on the page but is not yet recorded
struct Success {
    selector: String,
    strategy: HealingStrategy,
    confidence: f64,
    region: Option<Region>,
    manual_override: Option<ManualOverride>,
}

/// Low-confidence visual match a reviewer turned down
struct Rejection {
    approval_id: ApprovalId,
    suggested_selector: String,
    confidence: f64,
}

pub struct SelectorHealingResolver {
    policy: Arc<dyn HealingPolicyProvider>,
    store: Arc<HealingStore>,
    visual: Arc<dyn VisualMatcher>,
    approvals: Arc<dyn ApprovalGate>,
    publisher: Arc<dyn EventPublisher>,
    interaction: InteractOptions,
}

impl SelectorHealingResolver {
    pub fn new(
        policy: Arc<dyn HealingPolicyProvider>,
        store: Arc<HealingStore>,
        visual: Arc<dyn VisualMatcher>,
        approvals: Arc<dyn ApprovalGate>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            policy,
            store,
            visual,
            approvals,
            publisher,
            interaction: InteractOptions::default(),
        }
    }

    /// Per-attempt budget for candidate interactions
    pub fn with_interaction_timeout(mut self, timeout: Duration) -> Self {
        self.interaction = InteractOptions::with_timeout(timeout);
        self
    }

    pub fn store(&self) -> &Arc<HealingStore> {
        &self.store
    }

    async fn interact(
        &self,
        page: &dyn PageDriver,
        action: &InteractionKind,
        selector: &str,
    ) -> Result<(), ActionError> {
        match action {
            InteractionKind::Click => page.click(selector, &self.interaction).await,
            InteractionKind::Fill { value } => page.fill(selector, value, &self.interaction).await,
        }
    }

    async fn interact_at(
        &self,
        page: &dyn PageDriver,
        action: &InteractionKind,
        region: Region,
    ) -> Result<(), ActionError> {
        page.click_at(region.center()).await?;
        if let InteractionKind::Fill { value } = action {
            page.type_text(value).await?;
        }
        Ok(())
    }

    /// Try the ranked selector candidates; visual-match candidates are left
    /// to the fallback stage.
    async fn try_candidates(
        &self,
        page: &dyn PageDriver,
        request: &HealRequest,
        policy: &HealingPolicy,
        attempted: &mut Vec<String>,
    ) -> Option<Success> {
        let telemetry = self.store.telemetry();
        let ranked = rank_candidates(
            &request.original_selector,
            &request.candidates,
            &policy.enabled_strategies,
        );

        for candidate in ranked
            .iter()
            .filter(|candidate| candidate.strategy != HealingStrategy::VisualMatch)
        {
            if candidate.confidence < policy.auto_heal_threshold {
                debug!(
                    selector = %candidate.selector,
                    confidence = candidate.confidence,
                    threshold = policy.auto_heal_threshold,
                    "candidate below auto-heal threshold; not attempted"
                );
                continue;
            }

            telemetry.record_strategy_attempt(candidate.strategy.name());
            attempted.push(candidate.selector.clone());
            match self
                .interact(page, &request.action, &candidate.selector)
                .await
            {
                Ok(()) => {
                    telemetry.record_strategy_success(candidate.strategy.name());
                    return Some(Success {
                        selector: candidate.selector.clone(),
                        strategy: candidate.strategy,
                        confidence: candidate.confidence,
                        region: None,
                        manual_override: None,
                    });
                }
                Err(err) => {
                    telemetry.record_strategy_failure(candidate.strategy.name());
                    debug!(
                        selector = %candidate.selector,
                        strategy = %candidate.strategy,
                        error = %err,
                        "candidate failed on live page"
                    );
                }
            }
        }
        None
    }

    /// Visual fallback. `Err` means the escalation was rejected or expired.
    async fn try_visual(
        &self,
        page: &dyn PageDriver,
        request: &HealRequest,
        policy: &HealingPolicy,
        fingerprint: &VisualFingerprint,
    ) -> Result<Option<Success>, Rejection> {
        let telemetry = self.store.telemetry();
        let strategy = HealingStrategy::VisualMatch;
        telemetry.record_strategy_attempt(strategy.name());

        let found = match self.visual.find_by_fingerprint(page, fingerprint).await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "visual matcher failed");
                telemetry.record_strategy_failure(strategy.name());
                return Ok(None);
            }
        };
        let Some(region) = found.hit().filter(|_| found.confidence.is_finite()) else {
            debug!(signature = %fingerprint.signature, "no visual match");
            telemetry.record_strategy_failure(strategy.name());
            return Ok(None);
        };
        let confidence = found.confidence.clamp(0.0, 1.0);
        let selector = visual_selector(fingerprint, region);

        let mut manual_override = None;
        if confidence < policy.auto_heal_threshold {
            info!(
                confidence,
                threshold = policy.auto_heal_threshold,
                "visual match below threshold; escalating for approval"
            );
            let decision = self
                .approvals
                .request_decision(approval_request(
                    &request.context,
                    &request.original_selector,
                    &selector,
                    confidence,
                    region,
                ))
                .await;
            if !decision.approved {
                telemetry.record_strategy_failure(strategy.name());
                return Err(Rejection {
                    approval_id: decision.approval_id,
                    suggested_selector: selector,
                    confidence,
                });
            }
            manual_override = Some(ManualOverride {
                approval_id: decision.approval_id,
                approved_by: decision.resolved_by,
                approved_at: decision.resolved_at.unwrap_or_else(Utc::now),
            });
        }

        match self.interact_at(page, &request.action, region).await {
            Ok(()) => {
                telemetry.record_strategy_success(strategy.name());
                Ok(Some(Success {
                    selector,
                    strategy,
                    confidence,
                    region: Some(region),
                    manual_override,
                }))
            }
            Err(err) => {
                telemetry.record_strategy_failure(strategy.name());
                debug!(error = %err, "interaction at visual match failed");
                Ok(None)
            }
        }
    }

    async fn succeed(&self, request: &HealRequest, success: Success) -> HealOutcome {
        let context = &request.context;
        self.store.telemetry().record_success(&context.project_id);
        let record = self.store.record_heal(NewHeal {
            run_id: context.run_id.clone(),
            test_id: context.test_id.clone(),
            step_index: context.step_index,
            original_selector: request.original_selector.clone(),
            healed_selector: success.selector.clone(),
            strategy: success.strategy.name().to_string(),
            confidence: success.confidence,
            manual_override: success.manual_override.clone(),
        });
        self.announce(context, &record).await;

        info!(
            run_id = %context.run_id,
            step = context.step_index,
            original = %request.original_selector,
            healed = %success.selector,
            strategy = %success.strategy,
            confidence = success.confidence,
            "selector healed"
        );
        HealOutcome::Healed(HealedSelector {
            selector: success.selector,
            original_selector: request.original_selector.clone(),
            strategy: success.strategy,
            confidence: success.confidence,
            region: success.region,
            manual_override: success.manual_override,
            healing_id: record.id,
        })
    }

    async fn announce(&self, context: &HealContext, record: &HealingRecord) {
        let payload = serde_json::to_value(record).unwrap_or_default();
        if let Err(err) = self
            .publisher
            .publish(
                Channel::Organization(context.organization_id.clone()),
                HEALING_UPDATE_AVAILABLE,
                payload,
            )
            .await
        {
            warn!(error = %err, "failed to publish healing update");
        }
    }
}

#[async_trait]
impl SelfHealer for SelectorHealingResolver {
    async fn heal(
        &self,
        page: &dyn PageDriver,
        request: HealRequest,
    ) -> Result<HealOutcome, LocatorError> {
        let context = &request.context;
        let policy = self.policy.policy(&context.project_id);
        let threshold = policy.auto_heal_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(LocatorError::InvalidThreshold(threshold));
        }

        let telemetry = self.store.telemetry();
        telemetry.record_attempt(&context.project_id);
        info!(
            run_id = %context.run_id,
            step = context.step_index,
            selector = %request.original_selector,
            candidates = request.candidates.len(),
            "attempting selector heal"
        );

        let mut attempted = Vec::new();
        if let Some(success) = self
            .try_candidates(page, &request, &policy, &mut attempted)
            .await
        {
            return Ok(self.succeed(&request, success).await);
        }

        if policy
            .enabled_strategies
            .contains(HealingStrategy::VisualMatch)
        {
            if let Some(fingerprint) = &request.fingerprint {
                match self.try_visual(page, &request, &policy, fingerprint).await {
                    Ok(Some(success)) => return Ok(self.succeed(&request, success).await),
                    Ok(None) => {}
                    Err(rejection) => {
                        telemetry.record_failure(&context.project_id);
                        self.store
                            .record_healing_event(HealingEventEntry::rejected_suggestion(
                                context.run_id.clone(),
                                context.test_id.clone(),
                                context.step_index,
                                request.original_selector.clone(),
                                rejection.suggested_selector,
                                HealingStrategy::VisualMatch.name(),
                                rejection.confidence,
                                rejection.approval_id.clone(),
                            ));
                        warn!(
                            run_id = %context.run_id,
                            step = context.step_index,
                            approval_id = %rejection.approval_id,
                            "visual heal not approved"
                        );
                        return Ok(HealOutcome::Rejected {
                            approval_id: rejection.approval_id,
                        });
                    }
                }
            }
        }

        telemetry.record_failure(&context.project_id);
        self.store.record_healing_event(HealingEventEntry::failed(
            context.run_id.clone(),
            context.test_id.clone(),
            context.step_index,
            request.original_selector.clone(),
            format!("{} candidate(s) attempted, none succeeded", attempted.len()),
        ));
        warn!(
            run_id = %context.run_id,
            step = context.step_index,
            attempted = attempted.len(),
            "selector healing exhausted"
        );
        Ok(HealOutcome::Exhausted { attempted })
    }
}

/// Descriptor stored as the healed "selector" of a visual heal
fn visual_selector(fingerprint: &VisualFingerprint, region: Region) -> String {
    let center = region.center();
    format!(
        "visual:{}@{:.0},{:.0}",
        fingerprint.signature, center.x, center.y
    )
}

fn approval_request(
    context: &HealContext,
    original_selector: &str,
    suggested_selector: &str,
    confidence: f64,
    region: Region,
) -> ApprovalRequest {
    ApprovalRequest {
        run_id: context.run_id.clone(),
        test_id: context.test_id.clone(),
        organization_id: context.organization_id.clone(),
        project_id: context.project_id.clone(),
        step_index: context.step_index,
        original_selector: original_selector.to_string(),
        suggested_selector: suggested_selector.to_string(),
        strategy: HealingStrategy::VisualMatch.name().to_string(),
        confidence,
        visual_region: Some(region),
    }
}
