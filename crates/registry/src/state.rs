use std::sync::Arc;
use std::time::{Duration, Instant};

use action_primitives::BrowserHandle;
use dashmap::DashMap;
use healrun_core_types::{BrowserType, RunId, RunStatus};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{errors::RegistryError, metrics, status::RunStatusSource};

const MIN_POLL: Duration = Duration::from_millis(1);

/// Concurrency state of one live run.
pub struct RunSlot {
    pub browser: Arc<dyn BrowserHandle>,
    pub cancelled: bool,
    pub paused: bool,
    pub registered_at: Instant,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunStateSnapshot {
    pub run_id: RunId,
    pub browser: BrowserType,
    pub cancelled: bool,
    pub paused: bool,
    pub registered_for: Duration,
}

/// How a `wait_while_paused` call ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PauseOutcome {
    /// The run was not paused
    Running,
    /// The run was paused and has been resumed
    Resumed,
    /// The run was cancelled (possibly while paused)
    Cancelled,
}

/// Run-id keyed concurrency registry shared by the API layer and the
/// execution tasks. Every operation is total over unknown run ids.
pub struct RunRegistry {
    runs: DashMap<RunId, Arc<RwLock<RunSlot>>>,
    status_source: Option<Arc<dyn RunStatusSource>>,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            runs: DashMap::new(),
            status_source: None,
        }
    }

    /// Also treat runs whose persisted status is `Cancelling` as cancelled.
    pub fn with_status_source(status_source: Arc<dyn RunStatusSource>) -> Self {
        Self {
            runs: DashMap::new(),
            status_source: Some(status_source),
        }
    }

    /// Create (or replace) the state for `run` with both flags cleared.
    pub fn register(&self, run: &RunId, browser: Arc<dyn BrowserHandle>) {
        let slot = RunSlot {
            browser,
            cancelled: false,
            paused: false,
            registered_at: Instant::now(),
        };
        if self
            .runs
            .insert(run.clone(), Arc::new(RwLock::new(slot)))
            .is_some()
        {
            debug!(target: "run-registry", run_id = %run, "replaced existing registration");
        }
        info!(target: "run-registry", run_id = %run, "run registered");
        self.refresh_gauges();
    }

    /// Register and return a guard that unregisters when dropped.
    pub fn register_scoped(
        self: &Arc<Self>,
        run: &RunId,
        browser: Arc<dyn BrowserHandle>,
    ) -> RunRegistration {
        self.register(run, browser);
        RunRegistration {
            registry: Arc::clone(self),
            run_id: run.clone(),
        }
    }

    fn slot(&self, run: &RunId) -> Option<Arc<RwLock<RunSlot>>> {
        self.runs.get(run).map(|entry| Arc::clone(entry.value()))
    }

    pub fn mark_cancelled(&self, run: &RunId) {
        match self.slot(run) {
            Some(slot) => {
                slot.write().cancelled = true;
                metrics::record_cancellation();
                info!(target: "run-registry", run_id = %run, "run marked cancelled");
            }
            None => debug!(target: "run-registry", run_id = %run, "cancel for unknown run ignored"),
        }
    }

    pub fn mark_paused(&self, run: &RunId) {
        if let Some(slot) = self.slot(run) {
            slot.write().paused = true;
            info!(target: "run-registry", run_id = %run, "run marked paused");
            self.refresh_gauges();
        }
    }

    pub fn mark_resumed(&self, run: &RunId) {
        if let Some(slot) = self.slot(run) {
            slot.write().paused = false;
            info!(target: "run-registry", run_id = %run, "run marked resumed");
            self.refresh_gauges();
        }
    }

    /// Cancel flag of the concurrency state, or a `Cancelling` run status.
    pub fn is_cancelled(&self, run: &RunId) -> bool {
        let flagged = self
            .slot(run)
            .map(|slot| slot.read().cancelled)
            .unwrap_or(false);
        flagged
            || self
                .status_source
                .as_ref()
                .and_then(|source| source.run_status(run))
                == Some(RunStatus::Cancelling)
    }

    pub fn is_paused(&self, run: &RunId) -> bool {
        self.slot(run)
            .map(|slot| slot.read().paused)
            .unwrap_or(false)
    }

    /// Suspend the caller while the run is paused, re-checking every `poll`.
    /// Returns early when the run is cancelled.
    pub async fn wait_while_paused(&self, run: &RunId, poll: Duration) -> PauseOutcome {
        let poll = poll.max(MIN_POLL);
        let mut paused_since: Option<Instant> = None;
        loop {
            if self.is_cancelled(run) {
                return PauseOutcome::Cancelled;
            }
            if !self.is_paused(run) {
                return match paused_since {
                    Some(since) => {
                        info!(
                            target: "run-registry",
                            run_id = %run,
                            paused_ms = since.elapsed().as_millis() as u64,
                            "run resumed"
                        );
                        PauseOutcome::Resumed
                    }
                    None => PauseOutcome::Running,
                };
            }
            if paused_since.is_none() {
                debug!(target: "run-registry", run_id = %run, "waiting while paused");
                paused_since = Some(Instant::now());
            }
            tokio::time::sleep(poll).await;
        }
    }

    pub fn browser(&self, run: &RunId) -> Result<Arc<dyn BrowserHandle>, RegistryError> {
        self.slot(run)
            .map(|slot| Arc::clone(&slot.read().browser))
            .ok_or_else(|| RegistryError::NotRegistered(run.clone()))
    }

    /// Remove the run's state. Returns whether anything was registered.
    pub fn unregister(&self, run: &RunId) -> bool {
        let removed = self.runs.remove(run).is_some();
        if removed {
            info!(target: "run-registry", run_id = %run, "run unregistered");
            self.refresh_gauges();
        }
        removed
    }

    /// Best-effort browser shutdown followed by unregistration. Close errors
    /// are logged and swallowed; the browser may already be gone.
    pub async fn close_browser(&self, run: &RunId) {
        // Removing first makes a second concurrent close a no-op.
        let Some((_, slot)) = self.runs.remove(run) else {
            return;
        };
        self.refresh_gauges();
        let browser = Arc::clone(&slot.read().browser);
        close_quietly(run, browser).await;
    }

    /// Remove the run's state and hand back its browser without closing it.
    fn take_browser(&self, run: &RunId) -> Option<Arc<dyn BrowserHandle>> {
        let (_, slot) = self.runs.remove(run)?;
        info!(target: "run-registry", run_id = %run, "run unregistered");
        self.refresh_gauges();
        let browser = Arc::clone(&slot.read().browser);
        Some(browser)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn snapshot(&self) -> Vec<RunStateSnapshot> {
        let mut runs: Vec<RunStateSnapshot> = self
            .runs
            .iter()
            .map(|entry| {
                let slot = entry.value().read();
                RunStateSnapshot {
                    run_id: entry.key().clone(),
                    browser: slot.browser.browser_type(),
                    cancelled: slot.cancelled,
                    paused: slot.paused,
                    registered_for: slot.registered_at.elapsed(),
                }
            })
            .collect();
        runs.sort_by(|a, b| a.run_id.cmp(&b.run_id));
        runs
    }

    fn refresh_gauges(&self) {
        metrics::set_active_runs(self.runs.len());
        let paused = self
            .runs
            .iter()
            .filter(|entry| entry.value().read().paused)
            .count();
        metrics::set_paused_runs(paused);
    }
}

async fn close_quietly(run: &RunId, browser: Arc<dyn BrowserHandle>) {
    match browser.close().await {
        Ok(()) => info!(target: "run-registry", run_id = %run, "browser closed"),
        Err(err) if err.is_already_closed() => {
            debug!(target: "run-registry", run_id = %run, error = %err, "browser already closed")
        }
        Err(err) => {
            metrics::record_browser_close_failure();
            warn!(target: "run-registry", run_id = %run, error = %err, "browser close failed");
        }
    }
}

/// Registration that is released when dropped, on every exit path. A guard
/// dropped without [`RunRegistration::close`] (a panic or an abandoned run
/// future) still closes the browser on the current runtime.
pub struct RunRegistration {
    registry: Arc<RunRegistry>,
    run_id: RunId,
}

impl RunRegistration {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Close the browser now; the drop that follows is then a no-op.
    pub async fn close(self) {
        self.registry.close_browser(&self.run_id).await;
    }
}

impl Drop for RunRegistration {
    fn drop(&mut self) {
        let Some(browser) = self.registry.take_browser(&self.run_id) else {
            return;
        };
        let run_id = self.run_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { close_quietly(&run_id, browser).await });
            }
            Err(_) => {
                metrics::record_browser_close_failure();
                warn!(target: "run-registry", run_id = %run_id, "no runtime to close the browser of a dropped registration");
            }
        }
    }
}
