use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use healing_approval::PendingHealingApproval;
use healing_store::{HealingRecord, HealingStats};
use healrun_core_types::RunStatus;
use healrun_scheduler::metrics::{self as scheduler_metrics, SchedulerMetricsSnapshot};
use healrun_scheduler::RunReport;
use serde::Serialize;
use tracing::info;

use super::context::CliContext;
use crate::app::{HealrunApp, ReviewPolicy};
use crate::config::Config;
use crate::suite::Suite;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Suite file (YAML or JSON)
    pub suite: PathBuf,

    /// Approve every low-confidence heal that asks for review
    #[arg(long, conflicts_with = "reject")]
    pub approve: bool,

    /// Reject every low-confidence heal that asks for review
    #[arg(long)]
    pub reject: bool,

    /// Request cancellation after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub cancel_after: Option<u64>,
}

impl RunArgs {
    pub fn review_policy(&self) -> ReviewPolicy {
        if self.approve {
            ReviewPolicy::Approve
        } else if self.reject {
            ReviewPolicy::Reject
        } else {
            ReviewPolicy::Wait
        }
    }
}

/// Everything a finished suite produced
#[derive(Debug, Serialize)]
pub struct SuiteOutcome {
    pub report: RunReport,
    /// Heals recorded during the run, awaiting promotion
    pub heals: Vec<HealingRecord>,
    /// Approvals resolved during the run, most recent first
    pub approvals: Vec<PendingHealingApproval>,
    pub healing: HealingStats,
    pub scheduler: SchedulerMetricsSnapshot,
}

/// Execute `suite` against its fixture and collect the outcome
pub async fn execute_suite(
    config: &Config,
    suite: &Suite,
    policy: ReviewPolicy,
    cancel_after: Option<Duration>,
) -> Result<SuiteOutcome> {
    let app = HealrunApp::dry_run(config, &suite.fixture);
    for (test_id, selectors) in suite.step_selectors() {
        app.definitions().insert(test_id, selectors);
    }
    let event_log = app.spawn_event_log();
    let reviewer = app.spawn_reviewer(policy);

    let handle = app.dispatcher().spawn(suite.to_request());
    info!(target: "healrun", run_id = %handle.run_id, tests = suite.tests.len(), "run submitted");
    let canceller = cancel_after.map(|delay| {
        let dispatcher = app.dispatcher().clone();
        let run_id = handle.run_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.cancel(&run_id);
        })
    });

    let result = handle.wait().await;
    for task in reviewer.into_iter().chain(canceller) {
        task.abort();
    }
    event_log.abort();
    let report = result.context("run could not be executed")?;

    let heals = suite
        .tests
        .iter()
        .flat_map(|test| app.store().list_healing_records(&test.id, None))
        .collect();
    Ok(SuiteOutcome {
        report,
        heals,
        approvals: app.approvals().recently_resolved(),
        healing: app.store().stats(),
        scheduler: scheduler_metrics::snapshot(),
    })
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let suite = Suite::load(&args.suite).await?;
    let outcome = execute_suite(
        ctx.config(),
        &suite,
        args.review_policy(),
        args.cancel_after.map(Duration::from_millis),
    )
    .await?;

    match ctx.output().render(&outcome)? {
        Some(rendered) => println!("{rendered}"),
        None => print_human(&outcome),
    }

    let status = outcome.report.status;
    if status != RunStatus::Passed {
        bail!("run {} finished with status {}", outcome.report.run_id, status);
    }
    Ok(())
}

fn print_human(outcome: &SuiteOutcome) {
    let report = &outcome.report;
    println!(
        "Run {} {} in {} ms",
        report.run_id, report.status, report.duration_ms
    );
    for result in &report.results {
        let mut line = format!(
            "  [{:<9}] {} ({}) {} ms",
            result.status.label(),
            result.test_id,
            result.kind,
            result.duration_ms
        );
        if result.healed_steps > 0 {
            line.push_str(&format!(", {} healed step(s)", result.healed_steps));
        }
        if let Some(ratio) = result.diff_ratio {
            line.push_str(&format!(", diff {:.2}%", ratio * 100.0));
        }
        if let Some(error) = &result.error {
            line.push_str(&format!(": {error}"));
        }
        println!("{line}");
    }

    if !outcome.heals.is_empty() {
        println!("Heals awaiting review:");
        for heal in &outcome.heals {
            println!(
                "  {} step {}: {} -> {} ({}, {:.2}){}",
                heal.test_id,
                heal.step_index,
                heal.original_selector,
                heal.healed_selector,
                heal.strategy,
                heal.confidence,
                if heal.manual_override.is_some() {
                    " approved"
                } else {
                    ""
                }
            );
        }
    }
    for approval in &outcome.approvals {
        println!(
            "Approval {} for {} step {}: {:?}{}",
            approval.id,
            approval.test_id,
            approval.step_index,
            approval.status,
            if approval.timed_out { " (timed out)" } else { "" }
        );
    }
}
