use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use healrun_core_types::ProjectId;
use serde::{Deserialize, Serialize};

#[derive(Default)]
struct Counters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> CounterSnapshot {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        CounterSnapshot {
            attempts,
            successes,
            failures,
        }
    }
}

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

impl CounterSnapshot {
    pub fn success_rate(&self) -> f64 {
        let resolved = self.successes + self.failures;
        if resolved == 0 {
            0.0
        } else {
            self.successes as f64 / resolved as f64
        }
    }
}

/// Aggregate healing counters. Lives for the process; nothing is persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealingStats {
    #[serde(flatten)]
    pub total: CounterSnapshot,
    pub success_rate: f64,
    pub by_strategy: BTreeMap<String, CounterSnapshot>,
    pub by_project: BTreeMap<String, CounterSnapshot>,
}

/// Attempt/success/failure counters, globally, per strategy and per project.
///
/// Global and per-project counters move once per failure event and once per
/// resolved outcome; per-strategy counters move once per live-page attempt.
#[derive(Default)]
pub struct HealingTelemetry {
    total: Counters,
    by_strategy: DashMap<String, Counters>,
    by_project: DashMap<ProjectId, Counters>,
}

impl HealingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self, project: &ProjectId) {
        increment(&self.total.attempts);
        increment(&self.by_project.entry(project.clone()).or_default().attempts);
    }

    pub fn record_success(&self, project: &ProjectId) {
        increment(&self.total.successes);
        increment(&self.by_project.entry(project.clone()).or_default().successes);
    }

    pub fn record_failure(&self, project: &ProjectId) {
        increment(&self.total.failures);
        increment(&self.by_project.entry(project.clone()).or_default().failures);
    }

    pub fn record_strategy_attempt(&self, strategy: &str) {
        increment(&self.strategy(strategy).attempts);
    }

    pub fn record_strategy_success(&self, strategy: &str) {
        increment(&self.strategy(strategy).successes);
    }

    pub fn record_strategy_failure(&self, strategy: &str) {
        increment(&self.strategy(strategy).failures);
    }

    fn strategy(&self, strategy: &str) -> dashmap::mapref::one::RefMut<'_, String, Counters> {
        self.by_strategy.entry(strategy.to_string()).or_default()
    }

    pub fn snapshot(&self) -> HealingStats {
        let total = self.total.snapshot();
        let by_strategy = self
            .by_strategy
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect();
        let by_project = self
            .by_project
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().snapshot()))
            .collect();
        HealingStats {
            total,
            success_rate: total.success_rate(),
            by_strategy,
            by_project,
        }
    }

    pub fn project(&self, project: &ProjectId) -> CounterSnapshot {
        self.by_project
            .get(project)
            .map(|entry| entry.value().snapshot())
            .unwrap_or_default()
    }
}
