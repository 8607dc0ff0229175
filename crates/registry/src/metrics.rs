use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, IntGauge, Registry};
use tracing::error;

lazy_static! {
    static ref ACTIVE_RUNS: IntGauge =
        IntGauge::new("healrun_registry_active_runs", "Runs holding a browser handle").unwrap();
    static ref PAUSED_RUNS: IntGauge =
        IntGauge::new("healrun_registry_paused_runs", "Registered runs currently paused").unwrap();
    static ref CANCELLATIONS: IntCounter = IntCounter::new(
        "healrun_registry_cancellations_total",
        "Cancellation requests applied to registered runs",
    )
    .unwrap();
    static ref BROWSER_CLOSE_FAILURES: IntCounter = IntCounter::new(
        "healrun_registry_browser_close_failures_total",
        "Browser close calls that failed and were swallowed",
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register run registry metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, ACTIVE_RUNS.clone());
    register(registry, PAUSED_RUNS.clone());
    register(registry, CANCELLATIONS.clone());
    register(registry, BROWSER_CLOSE_FAILURES.clone());
}

pub fn set_active_runs(count: usize) {
    ACTIVE_RUNS.set(count as i64);
}

pub fn set_paused_runs(count: usize) {
    PAUSED_RUNS.set(count as i64);
}

pub fn record_cancellation() {
    CANCELLATIONS.inc();
}

pub fn record_browser_close_failure() {
    BROWSER_CLOSE_FAILURES.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_twice_is_harmless() {
        let registry = Registry::new();
        register_metrics(&registry);
        register_metrics(&registry);
        record_cancellation();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|family| family.get_name() == "healrun_registry_cancellations_total"));
    }
}
