//! Configuration module
//!
//! The YAML file has three sections, each falling back to defaults when
//! omitted: `healing` (thresholds, strategy allow-lists, approval timeout),
//! `execution` (step timeouts, pause polling, run concurrency) and `events`
//! (bus sizing). A few keys can be overridden from the environment.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use action_flow::ExecutorConfig;
use action_locator::{
    EnabledStrategies, HealingPolicy, HealingStrategy, StaticPolicyProvider,
    DEFAULT_AUTO_HEAL_THRESHOLD,
};
use healing_approval::{ApprovalConfig, DEFAULT_APPROVAL_TIMEOUT_SECS};
use healrun_core_types::ProjectId;
use healrun_scheduler::DispatcherConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::ConfigError;

pub const ENV_AUTO_HEAL_THRESHOLD: &str = "HEALRUN_AUTO_HEAL_THRESHOLD";
pub const ENV_APPROVAL_TIMEOUT_SECS: &str = "HEALRUN_APPROVAL_TIMEOUT_SECS";
pub const ENV_PAUSE_POLL_MS: &str = "HEALRUN_PAUSE_POLL_MS";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub healing: HealingConfig,
    pub execution: ExecutionConfig,
    pub events: EventsConfig,
}

/// Selector healing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Minimum confidence applied without human approval
    pub auto_heal_threshold: f64,
    /// Strategy tags (canonical names or aliases) the cascade may use
    pub enabled_strategies: Vec<String>,
    pub approval_timeout_secs: u64,
    /// Per-project overrides keyed by project id
    pub projects: BTreeMap<String, ProjectHealingConfig>,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            auto_heal_threshold: DEFAULT_AUTO_HEAL_THRESHOLD,
            enabled_strategies: HealingStrategy::all()
                .iter()
                .map(|strategy| strategy.name().to_string())
                .collect(),
            approval_timeout_secs: DEFAULT_APPROVAL_TIMEOUT_SECS,
            projects: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectHealingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_heal_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_strategies: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub pause_poll_ms: u64,
    pub navigation_timeout_ms: u64,
    pub interaction_timeout_ms: u64,
    pub assertion_timeout_ms: u64,
    pub capture_failure_screenshot: bool,
    pub max_concurrent_runs: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            pause_poll_ms: 1000,
            navigation_timeout_ms: 30_000,
            interaction_timeout_ms: 5_000,
            assertion_timeout_ms: 5_000,
            capture_failure_screenshot: true,
            max_concurrent_runs: DispatcherConfig::default().max_concurrent_runs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub bus_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { bus_capacity: 256 }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.healing.auto_heal_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ThresholdOutOfRange(threshold));
        }
        for (project, overrides) in &self.healing.projects {
            if let Some(value) = overrides.auto_heal_threshold {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ConfigError::ProjectThresholdOutOfRange {
                        project: project.clone(),
                        value,
                    });
                }
            }
        }
        if self.healing.approval_timeout_secs == 0 {
            return Err(ConfigError::ZeroApprovalTimeout);
        }
        if self.execution.pause_poll_ms == 0 {
            return Err(ConfigError::ZeroPausePoll);
        }
        if self.execution.max_concurrent_runs == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.events.bus_capacity == 0 {
            return Err(ConfigError::ZeroBusCapacity);
        }
        Ok(())
    }

    /// Apply `HEALRUN_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Values that do not parse, or that
    /// would make the configuration invalid, are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override::<f64>(&lookup, ENV_AUTO_HEAL_THRESHOLD) {
            if (0.0..=1.0).contains(&value) {
                self.healing.auto_heal_threshold = value;
                info!(target: "config", threshold = value, "auto-heal threshold overridden");
            } else {
                warn!(target: "config", key = ENV_AUTO_HEAL_THRESHOLD, value, "threshold outside [0, 1]; ignoring");
            }
        }
        if let Some(value) = parse_override::<u64>(&lookup, ENV_APPROVAL_TIMEOUT_SECS) {
            if value > 0 {
                self.healing.approval_timeout_secs = value;
            } else {
                warn!(target: "config", key = ENV_APPROVAL_TIMEOUT_SECS, "zero approval timeout; ignoring");
            }
        }
        if let Some(value) = parse_override::<u64>(&lookup, ENV_PAUSE_POLL_MS) {
            if value > 0 {
                self.execution.pause_poll_ms = value;
            } else {
                warn!(target: "config", key = ENV_PAUSE_POLL_MS, "zero pause poll interval; ignoring");
            }
        }
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target: "config", key, value = %raw, "invalid override value; ignoring");
            None
        }
    }
}

impl HealingConfig {
    /// Global policy plus one entry per configured project. Unknown
    /// strategy tags are reported and left disabled.
    pub fn policy_provider(&self) -> StaticPolicyProvider {
        let default = HealingPolicy {
            auto_heal_threshold: self.auto_heal_threshold,
            enabled_strategies: strategies_from_tags(&self.enabled_strategies, None),
        };
        let mut provider = StaticPolicyProvider::new(default.clone());
        for (project, overrides) in &self.projects {
            let policy = HealingPolicy {
                auto_heal_threshold: overrides
                    .auto_heal_threshold
                    .unwrap_or(default.auto_heal_threshold),
                enabled_strategies: match &overrides.enabled_strategies {
                    Some(tags) => strategies_from_tags(tags, Some(project)),
                    None => default.enabled_strategies.clone(),
                },
            };
            provider = provider.with_project(ProjectId::from(project.as_str()), policy);
        }
        provider
    }

    pub fn approval_config(&self) -> ApprovalConfig {
        ApprovalConfig::default().with_timeout(Duration::from_secs(self.approval_timeout_secs))
    }
}

fn strategies_from_tags(tags: &[String], project: Option<&str>) -> EnabledStrategies {
    let (enabled, unknown) = EnabledStrategies::from_tags(tags);
    if !unknown.is_empty() {
        warn!(
            target: "config",
            project = project.unwrap_or("*"),
            unknown = ?unknown,
            "unknown healing strategies are disabled"
        );
    }
    enabled
}

impl ExecutionConfig {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            pause_poll: Duration::from_millis(self.pause_poll_ms),
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            interaction_timeout: Duration::from_millis(self.interaction_timeout_ms),
            assertion_timeout: Duration::from_millis(self.assertion_timeout_ms),
            capture_failure_screenshot: self.capture_failure_screenshot,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_concurrent_runs: self.max_concurrent_runs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_locator::HealingPolicyProvider;
    use std::collections::HashMap;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.healing.auto_heal_threshold, 0.8);
        assert_eq!(config.healing.enabled_strategies.len(), 6);
        assert_eq!(config.execution.pause_poll_ms, 1000);
        assert_eq!(config.events.bus_capacity, 256);
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: Config = serde_yaml::from_str(
            "healing:\n  auto_heal_threshold: 0.9\nexecution:\n  pause_poll_ms: 250\n",
        )
        .unwrap();
        assert_eq!(config.healing.auto_heal_threshold, 0.9);
        assert_eq!(config.healing.approval_timeout_secs, 300);
        assert_eq!(config.execution.pause_poll_ms, 250);
        assert_eq!(config.execution.navigation_timeout_ms, 30_000);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.healing.auto_heal_threshold = 1.5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange(1.5))
        );

        let mut config = Config::default();
        config.healing.projects.insert(
            "p".into(),
            ProjectHealingConfig {
                auto_heal_threshold: Some(-0.1),
                enabled_strategies: None,
            },
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProjectThresholdOutOfRange { .. })
        ));

        let mut config = Config::default();
        config.execution.pause_poll_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroPausePoll));

        let mut config = Config::default();
        config.healing.approval_timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroApprovalTimeout));
    }

    #[test]
    fn overrides_apply_only_valid_values() {
        let vars: HashMap<&str, &str> = [
            (ENV_AUTO_HEAL_THRESHOLD, "0.65"),
            (ENV_APPROVAL_TIMEOUT_SECS, "soon"),
            (ENV_PAUSE_POLL_MS, "0"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.healing.auto_heal_threshold, 0.65);
        assert_eq!(config.healing.approval_timeout_secs, 300);
        assert_eq!(config.execution.pause_poll_ms, 1000);
    }

    #[test]
    fn project_overrides_reach_the_policy_provider() {
        let config: Config = serde_yaml::from_str(
            r#"
healing:
  auto_heal_threshold: 0.7
  enabled_strategies: [selector_fallback, data-testid, text, made-up]
  projects:
    checkout:
      auto_heal_threshold: 0.95
      enabled_strategies: [visual]
"#,
        )
        .unwrap();
        let provider = config.healing.policy_provider();

        let default = provider.policy(&ProjectId::from("anything"));
        assert_eq!(default.auto_heal_threshold, 0.7);
        assert_eq!(
            default.enabled_strategies.names(),
            vec!["selector_fallback", "text_match"]
        );

        let checkout = provider.policy(&ProjectId::from("checkout"));
        assert_eq!(checkout.auto_heal_threshold, 0.95);
        assert!(checkout
            .enabled_strategies
            .contains(HealingStrategy::VisualMatch));
        assert!(!checkout
            .enabled_strategies
            .contains(HealingStrategy::SelectorFallback));
    }

    #[test]
    fn execution_settings_map_to_executor_config() {
        let execution = ExecutionConfig {
            pause_poll_ms: 20,
            capture_failure_screenshot: false,
            ..ExecutionConfig::default()
        };
        let executor = execution.executor_config();
        assert_eq!(executor.pause_poll, Duration::from_millis(20));
        assert_eq!(executor.interaction_timeout, Duration::from_secs(5));
        assert!(!executor.capture_failure_screenshot);
        assert_eq!(execution.dispatcher_config().max_concurrent_runs, 8);
    }
}
