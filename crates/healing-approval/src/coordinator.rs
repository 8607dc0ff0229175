use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use healrun_core_types::{ApprovalId, RunId};
use healrun_event_bus::{
    Channel, EventPublisher, HEALING_APPROVAL_REQUIRED, HEALING_APPROVAL_RESOLVED,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::config::ApprovalConfig;
use crate::errors::ApprovalError;
use crate::model::{ApprovalRequest, ApprovalStatus, PendingHealingApproval};

/// One live approval: the record, the single-assignment completion and the
/// expiry timer. Removing the entry from the map is the claim that decides
/// who resolves it.
struct PendingEntry {
    approval: PendingHealingApproval,
    completion: oneshot::Sender<PendingHealingApproval>,
    timer: Option<AbortHandle>,
}

struct Inner {
    config: ApprovalConfig,
    publisher: Arc<dyn EventPublisher>,
    pending: DashMap<ApprovalId, PendingEntry>,
    resolved: Mutex<VecDeque<PendingHealingApproval>>,
}

/// Awaitable decision for one approval request.
#[derive(Debug)]
pub struct ApprovalHandle {
    approval: PendingHealingApproval,
    receiver: oneshot::Receiver<PendingHealingApproval>,
}

impl ApprovalHandle {
    pub fn id(&self) -> &ApprovalId {
        &self.approval.id
    }

    pub fn approval(&self) -> &PendingHealingApproval {
        &self.approval
    }

    /// Resolves to `true` only on explicit approval. Rejection and expiry
    /// both yield `false`.
    pub async fn wait(self) -> bool {
        self.outcome().await.is_approved()
    }

    /// The approval in its terminal state, resolver metadata included. A
    /// coordinator dropped before deciding reads as a rejection.
    pub async fn outcome(self) -> PendingHealingApproval {
        let Self { approval, receiver } = self;
        receiver.await.unwrap_or_else(|_| {
            let mut rejected = approval;
            rejected.status = ApprovalStatus::Rejected;
            rejected.resolved_at = Some(Utc::now());
            rejected
        })
    }
}

/// Tracks in-flight human approvals for low-confidence heals.
///
/// Every approval has its own id, timer and completion; a resolve call and
/// the timer race on removing the map entry, so exactly one of them takes
/// effect.
#[derive(Clone)]
pub struct ApprovalCoordinator {
    inner: Arc<Inner>,
}

impl ApprovalCoordinator {
    pub fn new(config: ApprovalConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                publisher,
                pending: DashMap::new(),
                resolved: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.inner.config
    }

    /// Register a pending approval, notify reviewers on the run and
    /// organization channels, and arm the expiry timer.
    pub async fn request_approval(
        &self,
        request: ApprovalRequest,
        timeout: Option<Duration>,
    ) -> ApprovalHandle {
        let timeout = timeout.unwrap_or(self.inner.config.default_timeout);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let approval = PendingHealingApproval::open(request, expires_at);
        let id = approval.id.clone();
        let (completion, receiver) = oneshot::channel();

        self.inner.pending.insert(
            id.clone(),
            PendingEntry {
                approval: approval.clone(),
                completion,
                timer: None,
            },
        );

        let inner = Arc::clone(&self.inner);
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            inner.expire(&timer_id).await;
        });
        match self.inner.pending.get_mut(&id) {
            Some(mut entry) => entry.timer = Some(timer.abort_handle()),
            // Resolved before the timer was attached.
            None => timer.abort(),
        }

        info!(
            target: "healing-approval",
            approval_id = %id,
            run_id = %approval.run_id,
            step = approval.step_index,
            confidence = approval.confidence,
            timeout_ms = timeout.as_millis() as u64,
            "healing approval requested"
        );

        let payload = serde_json::to_value(&approval).unwrap_or_default();
        self.inner
            .notify(
                Channel::Run(approval.run_id.clone()),
                HEALING_APPROVAL_REQUIRED,
                payload.clone(),
            )
            .await;
        self.inner
            .notify(
                Channel::Organization(approval.organization_id.clone()),
                HEALING_APPROVAL_REQUIRED,
                payload,
            )
            .await;

        ApprovalHandle { approval, receiver }
    }

    /// Settle a pending approval. Fails without side effects when the id is
    /// unknown, already resolved, or expired.
    pub async fn resolve(
        &self,
        id: &ApprovalId,
        approved: bool,
        resolver: impl Into<String>,
    ) -> Result<PendingHealingApproval, ApprovalError> {
        let (_, entry) = self
            .inner
            .pending
            .remove(id)
            .ok_or_else(|| ApprovalError::NotFound(id.clone()))?;
        if let Some(timer) = &entry.timer {
            timer.abort();
        }

        let mut approval = entry.approval;
        approval.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        approval.resolved_at = Some(Utc::now());
        approval.resolved_by = Some(resolver.into());
        if entry.completion.send(approval.clone()).is_err() {
            debug!(target: "healing-approval", approval_id = %id, "waiter already gone");
        }

        info!(
            target: "healing-approval",
            approval_id = %id,
            approved,
            resolver = approval.resolved_by.as_deref().unwrap_or_default(),
            "healing approval resolved"
        );
        self.inner.finish(approval.clone()).await;
        Ok(approval)
    }

    /// Pending approval, or a recently resolved one still in the log
    pub fn get(&self, id: &ApprovalId) -> Option<PendingHealingApproval> {
        if let Some(entry) = self.inner.pending.get(id) {
            return Some(entry.approval.clone());
        }
        self.inner
            .resolved
            .lock()
            .iter()
            .rev()
            .find(|approval| &approval.id == id)
            .cloned()
    }

    pub fn list_pending(&self, run_id: Option<&RunId>) -> Vec<PendingHealingApproval> {
        let mut pending: Vec<_> = self
            .inner
            .pending
            .iter()
            .filter(|entry| run_id.map_or(true, |run| &entry.approval.run_id == run))
            .map(|entry| entry.approval.clone())
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Most recent first
    pub fn recently_resolved(&self) -> Vec<PendingHealingApproval> {
        self.inner.resolved.lock().iter().rev().cloned().collect()
    }
}

impl Inner {
    async fn expire(&self, id: &ApprovalId) {
        let Some((_, entry)) = self.pending.remove(id) else {
            return;
        };
        let mut approval = entry.approval;
        approval.status = ApprovalStatus::Rejected;
        approval.resolved_at = Some(Utc::now());
        approval.timed_out = true;
        let _ = entry.completion.send(approval.clone());

        warn!(
            target: "healing-approval",
            approval_id = %id,
            run_id = %approval.run_id,
            "healing approval timed out; treating as rejected"
        );
        self.finish(approval).await;
    }

    async fn finish(&self, approval: PendingHealingApproval) {
        {
            let mut resolved = self.resolved.lock();
            if self.config.resolved_log_capacity > 0 {
                while resolved.len() >= self.config.resolved_log_capacity {
                    resolved.pop_front();
                }
                resolved.push_back(approval.clone());
            }
        }

        let payload = serde_json::to_value(&approval).unwrap_or_default();
        self.notify(
            Channel::Run(approval.run_id.clone()),
            HEALING_APPROVAL_RESOLVED,
            payload.clone(),
        )
        .await;
        self.notify(
            Channel::Organization(approval.organization_id.clone()),
            HEALING_APPROVAL_RESOLVED,
            payload,
        )
        .await;
    }

    async fn notify(&self, channel: Channel, event: &str, payload: Value) {
        if let Err(err) = self.publisher.publish(channel.clone(), event, payload).await {
            warn!(
                target: "healing-approval",
                %channel,
                event,
                error = %err,
                "failed to publish approval event"
            );
        }
    }
}
