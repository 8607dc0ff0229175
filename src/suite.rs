//! Suite files: the run to start, the tests it executes and, for dry runs,
//! the scripted page the tests execute against.

use std::path::Path;

use action_primitives::scripted::PageFixture;
use anyhow::{bail, Context, Result};
use healrun_core_types::{BrowserType, OrganizationId, Priority, ProjectId, Run, TestId};
use healrun_scheduler::{RunRequest, TestDefinition, TestKind};
use serde::{Deserialize, Serialize};
use tokio::fs;

fn default_organization() -> String {
    "local".to_string()
}

fn default_project() -> String {
    "default".to_string()
}

/// Identity and browser of the run a suite starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default)]
    pub browser: BrowserType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            project: default_project(),
            browser: BrowserType::default(),
            branch: None,
            priority: Priority::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Suite {
    #[serde(default)]
    pub run: RunSettings,
    /// Page the scripted driver serves in dry runs
    #[serde(default)]
    pub fixture: PageFixture,
    pub tests: Vec<TestDefinition>,
}

impl Suite {
    pub async fn load(path: &Path) -> Result<Suite> {
        let raw = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading suite {}", path.display()))?;
        Suite::parse(&raw).with_context(|| format!("loading suite {}", path.display()))
    }

    /// Parse a YAML (or JSON) suite document and reject empty or
    /// malformed test lists before anything is launched.
    pub fn parse(raw: &str) -> Result<Suite> {
        let suite: Suite = serde_yaml::from_str(raw).context("parsing suite document")?;
        suite.check()?;
        Ok(suite)
    }

    fn check(&self) -> Result<()> {
        if self.tests.is_empty() {
            bail!("suite contains no tests");
        }
        let mut seen = std::collections::HashSet::new();
        for test in &self.tests {
            if !seen.insert(&test.id) {
                bail!("duplicate test id {}", test.id);
            }
            match test.kind {
                TestKind::E2e => test
                    .script()
                    .validate()
                    .with_context(|| format!("test {}", test.id))?,
                TestKind::Visual if test.visual.is_none() => {
                    bail!("visual test {} has no visual settings", test.id)
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Selector per step of every end-to-end test, in the shape the
    /// definition store keeps them.
    pub fn step_selectors(&self) -> Vec<(TestId, Vec<Option<String>>)> {
        self.tests
            .iter()
            .filter(|test| test.kind == TestKind::E2e)
            .map(|test| {
                let selectors = test
                    .steps
                    .iter()
                    .map(|step| step.action.selector().map(str::to_string))
                    .collect();
                (test.id.clone(), selectors)
            })
            .collect()
    }

    pub fn to_request(&self) -> RunRequest {
        let mut run = Run::new(
            OrganizationId::from(self.run.organization.as_str()),
            ProjectId::from(self.run.project.as_str()),
        )
        .with_browser(self.run.browser)
        .with_priority(self.run.priority);
        if let Some(branch) = &self.run.branch {
            run = run.with_branch(branch.clone());
        }
        RunRequest::new(run, self.tests.clone())
    }
}
