use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

use healrun_core_types::RunStatus;

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    passed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    errored: AtomicU64,
    tests_executed: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_started() {
    increment(&COUNTERS.started);
}

pub fn record_test_executed() {
    increment(&COUNTERS.tests_executed);
}

/// Count a finished run under its terminal status
pub fn record_finished(status: RunStatus) {
    match status {
        RunStatus::Passed => increment(&COUNTERS.passed),
        RunStatus::Failed => increment(&COUNTERS.failed),
        RunStatus::Cancelled => increment(&COUNTERS.cancelled),
        _ => increment(&COUNTERS.errored),
    }
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct SchedulerMetricsSnapshot {
    pub started: u64,
    pub passed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub errored: u64,
    pub tests_executed: u64,
}

impl SchedulerMetricsSnapshot {
    pub fn completed(&self) -> u64 {
        self.passed + self.failed + self.cancelled + self.errored
    }
}

pub fn snapshot() -> SchedulerMetricsSnapshot {
    SchedulerMetricsSnapshot {
        started: COUNTERS.started.load(Ordering::Relaxed),
        passed: COUNTERS.passed.load(Ordering::Relaxed),
        failed: COUNTERS.failed.load(Ordering::Relaxed),
        cancelled: COUNTERS.cancelled.load(Ordering::Relaxed),
        errored: COUNTERS.errored.load(Ordering::Relaxed),
        tests_executed: COUNTERS.tests_executed.load(Ordering::Relaxed),
    }
}
