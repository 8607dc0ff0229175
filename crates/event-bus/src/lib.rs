use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use healrun_core_types::{CoreError, OrganizationId, RunId};

pub const STEP_START: &str = "step-start";
pub const STEP_PROGRESS: &str = "step-progress";
pub const STEP_COMPLETE: &str = "step-complete";
pub const TEST_START: &str = "test-start";
pub const TEST_COMPLETE: &str = "test-complete";
pub const RUN_COMPLETE: &str = "run-complete";
pub const HEALING_APPROVAL_REQUIRED: &str = "healing_approval_required";
pub const HEALING_APPROVAL_RESOLVED: &str = "healing_approval_resolved";
pub const HEALING_UPDATE_AVAILABLE: &str = "healing_update_available";

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), CoreError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Simple in-memory bus suitable for unit tests and single-process deployments.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), CoreError> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|err| CoreError::new(err.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Helper to materialise an mpsc receiver from the bus subscription
/// so callers can await events without handling broadcast semantics directly.
pub fn to_mpsc<E>(bus: Arc<InMemoryBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Ok(ev) = rx.recv().await {
            if tx.send(ev).await.is_err() {
                break;
            }
        }
    });
    out_rx
}

/// Subscriber scope of a published event.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum Channel {
    Run(RunId),
    Organization(OrganizationId),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Run(id) => write!(f, "run:{id}"),
            Channel::Organization(id) => write!(f, "org:{id}"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel: Channel,
    pub name: String,
    pub payload: Value,
    pub emitted_at: DateTime<Utc>,
}

impl ChannelEvent {
    pub fn new(channel: Channel, name: impl Into<String>, payload: Value) -> Self {
        Self {
            channel,
            name: name.into(),
            payload,
            emitted_at: Utc::now(),
        }
    }
}

/// Notification transport consumed by the orchestration core.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, channel: Channel, event: &str, payload: Value)
        -> Result<(), CoreError>;
}

#[async_trait]
impl<P> EventPublisher for Arc<P>
where
    P: EventPublisher + ?Sized,
{
    async fn publish(
        &self,
        channel: Channel,
        event: &str,
        payload: Value,
    ) -> Result<(), CoreError> {
        (**self).publish(channel, event, payload).await
    }
}

/// Publisher backed by an [`InMemoryBus`]. Publishing with no live subscriber
/// is not an error: UI clients come and go independently of runs.
#[derive(Clone)]
pub struct BusPublisher {
    bus: Arc<InMemoryBus<ChannelEvent>>,
}

impl BusPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            bus: InMemoryBus::new(capacity),
        }
    }

    pub fn from_bus(bus: Arc<InMemoryBus<ChannelEvent>>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> Arc<InMemoryBus<ChannelEvent>> {
        Arc::clone(&self.bus)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.bus.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BusPublisher {
    async fn publish(
        &self,
        channel: Channel,
        event: &str,
        payload: Value,
    ) -> Result<(), CoreError> {
        if self.bus.subscriber_count() == 0 {
            debug!(target: "event_bus", %channel, event, "no subscribers; event dropped");
            return Ok(());
        }
        self.bus
            .publish(ChannelEvent::new(channel, event, payload))
            .await
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(
        &self,
        _channel: Channel,
        _event: &str,
        _payload: Value,
    ) -> Result<(), CoreError> {
        Ok(())
    }
}
