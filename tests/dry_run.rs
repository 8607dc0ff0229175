use std::time::Duration;

use healing_approval::ApprovalStatus;
use healing_store::HealingRecordStatus;
use healrun_cli::cli::run::execute_suite;
use healrun_cli::{Config, ReviewPolicy, Suite};
use healrun_core_types::RunStatus;
use healrun_scheduler::TestResultStatus;

fn fast_config() -> Config {
    let mut config = Config::default();
    config.execution.pause_poll_ms = 5;
    config
}

const HEALABLE: &str = r##"
run:
  organization: acme
  project: shop
fixture:
  url: https://shop.test/
  elements: ["#search", "[data-testid=buy]"]
tests:
  - id: checkout
    steps:
      - type: navigate
        url: https://shop.test/
      - type: click
        selector: "#buy-now"
        alternatives:
          - selector: "[data-testid=buy]"
            strategy: data-testid
            confidence: 0.93
          - selector: "text=Buy"
            strategy: text
            confidence: 0.4
      - type: checkpoint
        label: bought
  - id: home
    kind: visual
    visual:
      url: https://shop.test/
      baseline: home
"##;

#[tokio::test]
async fn broken_selector_is_healed_from_alternatives() {
    let suite = Suite::parse(HEALABLE).unwrap();
    let outcome = execute_suite(&fast_config(), &suite, ReviewPolicy::Wait, None)
        .await
        .unwrap();

    assert_eq!(outcome.report.status, RunStatus::Passed);
    let checkout = &outcome.report.results[0];
    assert_eq!(checkout.status, TestResultStatus::Passed);
    assert_eq!(checkout.healed_steps, 1);
    let healed = &checkout.steps[1].healing;
    assert!(healed.was_healed);
    assert_eq!(healed.healed_selector.as_deref(), Some("[data-testid=buy]"));
    assert_eq!(healed.strategy.as_deref(), Some("selector_fallback"));

    assert_eq!(outcome.heals.len(), 1);
    assert_eq!(outcome.heals[0].status, HealingRecordStatus::Pending);
    assert_eq!(outcome.heals[0].original_selector, "#buy-now");
    assert_eq!(outcome.healing.total.successes, 1);
    assert!(outcome.approvals.is_empty());

    assert_eq!(outcome.report.results[1].status, TestResultStatus::Passed);
    assert_eq!(outcome.report.results[1].diff_ratio, Some(0.0));
}

const VISUAL_ONLY: &str = r##"
fixture:
  url: https://shop.test/
  visual_matches:
    buy-button:
      found: true
      confidence: 0.55
      region: { x: 100.0, y: 40.0, width: 80.0, height: 24.0 }
tests:
  - id: checkout
    steps:
      - type: click
        selector: "#buy-now"
        fingerprint:
          signature: buy-button
          label: Buy now
"##;

#[tokio::test]
async fn low_confidence_visual_match_waits_for_approval() {
    let suite = Suite::parse(VISUAL_ONLY).unwrap();
    let outcome = execute_suite(&fast_config(), &suite, ReviewPolicy::Approve, None)
        .await
        .unwrap();

    assert_eq!(outcome.report.status, RunStatus::Passed);
    let step = &outcome.report.results[0].steps[0];
    assert!(step.healing.was_healed);
    assert!(step.healing.manual_override);
    assert_eq!(step.healing.approved_by.as_deref(), Some("healrun-cli"));
    assert_eq!(step.healing.strategy.as_deref(), Some("visual_match"));

    assert_eq!(outcome.approvals.len(), 1);
    assert_eq!(outcome.approvals[0].status, ApprovalStatus::Approved);
    assert!(outcome.heals[0].manual_override.is_some());
}

#[tokio::test]
async fn rejected_approval_fails_the_step_with_its_original_error() {
    let suite = Suite::parse(VISUAL_ONLY).unwrap();
    let outcome = execute_suite(&fast_config(), &suite, ReviewPolicy::Reject, None)
        .await
        .unwrap();

    assert_eq!(outcome.report.status, RunStatus::Failed);
    let result = &outcome.report.results[0];
    assert_eq!(result.status, TestResultStatus::Failed);
    assert!(result.error.as_deref().unwrap_or_default().contains("#buy-now"));
    assert!(outcome.heals.is_empty());
    assert_eq!(outcome.approvals[0].status, ApprovalStatus::Rejected);
    assert!(!outcome.approvals[0].timed_out);
}

#[tokio::test]
async fn unanswered_approval_times_out_as_rejection() {
    let suite = Suite::parse(VISUAL_ONLY).unwrap();
    let mut config = fast_config();
    config.healing.approval_timeout_secs = 1;

    let outcome = execute_suite(&config, &suite, ReviewPolicy::Wait, None)
        .await
        .unwrap();
    assert_eq!(outcome.report.status, RunStatus::Failed);
    assert!(outcome.approvals[0].timed_out);
    assert!(outcome.report.duration_ms >= 1000);
}

#[tokio::test]
async fn cancel_after_stops_the_run() {
    let suite = Suite::parse(
        r##"
fixture:
  elements: ["#1", "#2", "#3", "#4", "#5"]
  latency_ms: 20
tests:
  - id: slow
    steps:
      - { type: click, selector: "#1" }
      - { type: click, selector: "#2" }
      - { type: click, selector: "#3" }
      - { type: click, selector: "#4" }
      - { type: click, selector: "#5" }
  - id: never
    steps:
      - { type: click, selector: "#1" }
"##,
    )
    .unwrap();

    let outcome = execute_suite(
        &fast_config(),
        &suite,
        ReviewPolicy::Wait,
        Some(Duration::from_millis(30)),
    )
    .await
    .unwrap();
    assert_eq!(outcome.report.status, RunStatus::Cancelled);
    assert_eq!(outcome.report.results.len(), 1);
    assert!(outcome.report.results[0].steps.len() < 5);
}
