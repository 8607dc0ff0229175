//! Per-project healing policy

use std::collections::HashMap;

use healrun_core_types::ProjectId;
use serde::{Deserialize, Serialize};

use crate::strategies::EnabledStrategies;

pub const DEFAULT_AUTO_HEAL_THRESHOLD: f64 = 0.8;

/// Threshold and allow-list the cascade applies for one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingPolicy {
    /// Minimum confidence applied without human approval
    pub auto_heal_threshold: f64,

    /// Strategies the cascade may use
    pub enabled_strategies: EnabledStrategies,
}

impl Default for HealingPolicy {
    fn default() -> Self {
        Self {
            auto_heal_threshold: DEFAULT_AUTO_HEAL_THRESHOLD,
            enabled_strategies: EnabledStrategies::all(),
        }
    }
}

/// Project configuration provider consumed by the resolver
pub trait HealingPolicyProvider: Send + Sync {
    fn auto_heal_threshold(&self, project: &ProjectId) -> f64;

    fn enabled_strategies(&self, project: &ProjectId) -> EnabledStrategies;

    fn policy(&self, project: &ProjectId) -> HealingPolicy {
        HealingPolicy {
            auto_heal_threshold: self.auto_heal_threshold(project),
            enabled_strategies: self.enabled_strategies(project),
        }
    }
}

/// Global default plus per-project overrides, fixed at construction
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyProvider {
    default: HealingPolicy,
    projects: HashMap<ProjectId, HealingPolicy>,
}

impl StaticPolicyProvider {
    pub fn new(default: HealingPolicy) -> Self {
        Self {
            default,
            projects: HashMap::new(),
        }
    }

    pub fn with_project(mut self, project: ProjectId, policy: HealingPolicy) -> Self {
        self.projects.insert(project, policy);
        self
    }

    pub fn default_policy(&self) -> &HealingPolicy {
        &self.default
    }
}

impl HealingPolicyProvider for StaticPolicyProvider {
    fn auto_heal_threshold(&self, project: &ProjectId) -> f64 {
        self.projects
            .get(project)
            .unwrap_or(&self.default)
            .auto_heal_threshold
    }

    fn enabled_strategies(&self, project: &ProjectId) -> EnabledStrategies {
        self.projects
            .get(project)
            .unwrap_or(&self.default)
            .enabled_strategies
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::HealingStrategy;

    #[test]
    fn project_override_wins_over_default() {
        let provider = StaticPolicyProvider::default().with_project(
            ProjectId::from("strict"),
            HealingPolicy {
                auto_heal_threshold: 0.95,
                enabled_strategies: [HealingStrategy::SelectorFallback].into_iter().collect(),
            },
        );
        assert_eq!(provider.auto_heal_threshold(&ProjectId::from("strict")), 0.95);
        assert_eq!(
            provider.auto_heal_threshold(&ProjectId::from("other")),
            DEFAULT_AUTO_HEAL_THRESHOLD
        );
        assert!(!provider
            .enabled_strategies(&ProjectId::from("strict"))
            .contains(HealingStrategy::VisualMatch));
    }
}
