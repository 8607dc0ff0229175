//! Visual regression tests: screenshot a page and compare it with a stored
//! baseline through an external image comparator.

use std::sync::Arc;
use std::time::{Duration, Instant};

use action_flow::ExecutionContext;
use action_primitives::{NavigateOptions, PageDriver, ScreenshotOptions};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{info, warn};

use crate::executor::TestTypeExecutor;
use crate::model::{TestDefinition, TestKind, TestResult, TestResultStatus};

/// Black-box image diff. Returns the fraction (0..=1) of differing pixels.
pub trait ImageComparator: Send + Sync {
    fn diff_ratio(&self, baseline: &[u8], current: &[u8]) -> Result<f64, String>;
}

/// Byte-wise comparison; stands in for a pixel comparator in dry runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ByteDiffComparator;

impl ImageComparator for ByteDiffComparator {
    fn diff_ratio(&self, baseline: &[u8], current: &[u8]) -> Result<f64, String> {
        let longest = baseline.len().max(current.len());
        if longest == 0 {
            return Ok(0.0);
        }
        let same = baseline
            .iter()
            .zip(current)
            .filter(|(a, b)| a == b)
            .count();
        Ok((longest - same) as f64 / longest as f64)
    }
}

pub trait BaselineStore: Send + Sync {
    fn load(&self, key: &str) -> Option<Vec<u8>>;

    fn save(&self, key: &str, image: Vec<u8>);
}

#[derive(Default)]
pub struct InMemoryBaselineStore {
    images: DashMap<String, Vec<u8>>,
}

impl InMemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl BaselineStore for InMemoryBaselineStore {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.images.get(key).map(|entry| entry.value().clone())
    }

    fn save(&self, key: &str, image: Vec<u8>) {
        self.images.insert(key.to_string(), image);
    }
}

pub struct VisualRegressionExecutor {
    comparator: Arc<dyn ImageComparator>,
    baselines: Arc<dyn BaselineStore>,
    navigation_timeout: Duration,
}

impl VisualRegressionExecutor {
    pub fn new(comparator: Arc<dyn ImageComparator>, baselines: Arc<dyn BaselineStore>) -> Self {
        Self {
            comparator,
            baselines,
            navigation_timeout: NavigateOptions::default().timeout,
        }
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }
}

#[async_trait]
impl TestTypeExecutor for VisualRegressionExecutor {
    fn kind(&self) -> TestKind {
        TestKind::Visual
    }

    async fn execute(
        &self,
        page: &dyn PageDriver,
        ctx: &ExecutionContext,
        test: &TestDefinition,
    ) -> TestResult {
        let started = Instant::now();
        let Some(check) = test.visual.as_ref() else {
            return TestResult::errored(test, "visual test has no visual settings")
                .with_duration(started.elapsed());
        };

        let navigate = NavigateOptions {
            timeout: self.navigation_timeout,
            ..NavigateOptions::default()
        };
        let captured = match page.navigate(&check.url, &navigate).await {
            Ok(()) => {
                page.screenshot(&ScreenshotOptions {
                    full_page: check.full_page,
                })
                .await
            }
            Err(err) => Err(err),
        };
        let image = match captured {
            Ok(image) => image,
            Err(err) => {
                let mut result = TestResult::new(test, TestResultStatus::Failed);
                result.error = Some(err.to_string());
                return result.with_duration(started.elapsed());
            }
        };

        let mut result = TestResult::new(test, TestResultStatus::Passed);
        result.screenshots = 1;
        match self.baselines.load(&check.baseline) {
            None => {
                info!(
                    target: "scheduler",
                    run_id = %ctx.run_id,
                    test_id = %test.id,
                    baseline = %check.baseline,
                    "no baseline stored; current screenshot becomes the baseline"
                );
                self.baselines.save(&check.baseline, image);
                result.diff_ratio = Some(0.0);
            }
            Some(baseline) => match self.comparator.diff_ratio(&baseline, &image) {
                Ok(ratio) => {
                    result.diff_ratio = Some(ratio);
                    if ratio > check.max_diff_ratio {
                        result.status = TestResultStatus::Failed;
                        result.error = Some(format!(
                            "screenshot differs from baseline {} by {:.2}% (max {:.2}%)",
                            check.baseline,
                            ratio * 100.0,
                            check.max_diff_ratio * 100.0
                        ));
                    }
                }
                Err(err) => {
                    warn!(target: "scheduler", test_id = %test.id, error = %err, "image comparison failed");
                    result.status = TestResultStatus::Error;
                    result.error = Some(format!("image comparison failed: {err}"));
                }
            },
        }
        result.with_duration(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VisualCheck;
    use action_primitives::scripted::ScriptedPage;
    use healrun_core_types::{OrganizationId, ProjectId, RunId};

    fn ctx() -> ExecutionContext {
        ExecutionContext {
            run_id: RunId::from("run"),
            project_id: ProjectId::from("proj"),
            organization_id: OrganizationId::from("org"),
        }
    }

    fn home() -> TestDefinition {
        TestDefinition::visual(
            "home",
            VisualCheck {
                url: "https://app.test/".into(),
                baseline: "home".into(),
                max_diff_ratio: 0.01,
                full_page: false,
            },
        )
    }

    #[test]
    fn byte_diff_counts_length_changes() {
        let comparator = ByteDiffComparator;
        assert_eq!(comparator.diff_ratio(b"", b"").unwrap(), 0.0);
        assert_eq!(comparator.diff_ratio(b"abcd", b"abcd").unwrap(), 0.0);
        assert_eq!(comparator.diff_ratio(b"abcd", b"abxd").unwrap(), 0.25);
        assert_eq!(comparator.diff_ratio(b"ab", b"abcd").unwrap(), 0.5);
    }

    #[tokio::test]
    async fn first_run_records_baseline_then_detects_drift() {
        let baselines = Arc::new(InMemoryBaselineStore::new());
        let executor =
            VisualRegressionExecutor::new(Arc::new(ByteDiffComparator), baselines.clone());

        let page = ScriptedPage::new().with_element("#hero");
        let first = executor.execute(&page, &ctx(), &home()).await;
        assert_eq!(first.status, TestResultStatus::Passed);
        assert_eq!(first.diff_ratio, Some(0.0));
        assert_eq!(baselines.len(), 1);

        let unchanged = executor.execute(&page, &ctx(), &home()).await;
        assert_eq!(unchanged.status, TestResultStatus::Passed);

        let redesigned = ScriptedPage::new().with_element("#new-hero-banner");
        let drifted = executor.execute(&redesigned, &ctx(), &home()).await;
        assert_eq!(drifted.status, TestResultStatus::Failed);
        assert!(drifted.diff_ratio.unwrap() > 0.01);
        assert!(drifted.error.unwrap().contains("differs from baseline home"));
    }

    #[tokio::test]
    async fn missing_settings_is_an_error_result() {
        let executor = VisualRegressionExecutor::new(
            Arc::new(ByteDiffComparator),
            Arc::new(InMemoryBaselineStore::new()),
        );
        let mut test = home();
        test.visual = None;
        let result = executor.execute(&ScriptedPage::new(), &ctx(), &test).await;
        assert_eq!(result.status, TestResultStatus::Error);
    }
}
