//! Healing strategies and the static alias table
//!
//! Test definitions tag alternative selectors with free-form strategy names
//! (`id`, `data-testid`, `aria-label`, ...). Those tags collapse onto a small
//! set of canonical strategies that projects enable or disable.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Canonical healing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingStrategy {
    /// Stable attribute selectors recorded next to the primary one
    SelectorFallback,

    /// ARIA and form attribute matching
    AttributeMatch,

    /// Visible text matching
    TextMatch,

    /// Structural CSS path
    CssPath,

    /// XPath expression
    XPath,

    /// Fingerprint-based visual lookup, always tried last
    VisualMatch,
}

impl HealingStrategy {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            HealingStrategy::SelectorFallback => "selector_fallback",
            HealingStrategy::AttributeMatch => "attribute_match",
            HealingStrategy::TextMatch => "text_match",
            HealingStrategy::CssPath => "css_path",
            HealingStrategy::XPath => "xpath",
            HealingStrategy::VisualMatch => "visual_match",
        }
    }

    pub fn all() -> [HealingStrategy; 6] {
        [
            HealingStrategy::SelectorFallback,
            HealingStrategy::AttributeMatch,
            HealingStrategy::TextMatch,
            HealingStrategy::CssPath,
            HealingStrategy::XPath,
            HealingStrategy::VisualMatch,
        ]
    }

    /// Map a candidate tag (canonical name or alias) to its strategy
    pub fn from_tag(tag: &str) -> Option<HealingStrategy> {
        let normalized = tag.trim().to_ascii_lowercase();
        STRATEGY_ALIASES.get(normalized.as_str()).copied()
    }
}

impl fmt::Display for HealingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Alias table, canonical names included
pub const ALIAS_TABLE: &[(&str, HealingStrategy)] = &[
    ("selector_fallback", HealingStrategy::SelectorFallback),
    ("id", HealingStrategy::SelectorFallback),
    ("data-testid", HealingStrategy::SelectorFallback),
    ("data-test", HealingStrategy::SelectorFallback),
    ("name", HealingStrategy::SelectorFallback),
    ("attribute_match", HealingStrategy::AttributeMatch),
    ("aria-label", HealingStrategy::AttributeMatch),
    ("role", HealingStrategy::AttributeMatch),
    ("placeholder", HealingStrategy::AttributeMatch),
    ("title", HealingStrategy::AttributeMatch),
    ("text_match", HealingStrategy::TextMatch),
    ("text", HealingStrategy::TextMatch),
    ("css_path", HealingStrategy::CssPath),
    ("css", HealingStrategy::CssPath),
    ("css-path", HealingStrategy::CssPath),
    ("xpath", HealingStrategy::XPath),
    ("visual_match", HealingStrategy::VisualMatch),
    ("visual", HealingStrategy::VisualMatch),
    ("visual-match", HealingStrategy::VisualMatch),
];

static STRATEGY_ALIASES: Lazy<HashMap<&'static str, HealingStrategy>> =
    Lazy::new(|| ALIAS_TABLE.iter().copied().collect());

/// Set of strategies a project allows the cascade to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnabledStrategies(BTreeSet<HealingStrategy>);

impl EnabledStrategies {
    pub fn all() -> Self {
        Self(HealingStrategy::all().into_iter().collect())
    }

    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    /// Build from configured tags. Unknown tags are returned separately so
    /// the caller can report them.
    pub fn from_tags<I, S>(tags: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut enabled = BTreeSet::new();
        let mut unknown = Vec::new();
        for tag in tags {
            match HealingStrategy::from_tag(tag.as_ref()) {
                Some(strategy) => {
                    enabled.insert(strategy);
                }
                None => unknown.push(tag.as_ref().to_string()),
            }
        }
        (Self(enabled), unknown)
    }

    pub fn contains(&self, strategy: HealingStrategy) -> bool {
        self.0.contains(&strategy)
    }

    /// Unknown tags are never enabled
    pub fn allows_tag(&self, tag: &str) -> bool {
        HealingStrategy::from_tag(tag).is_some_and(|strategy| self.contains(strategy))
    }

    pub fn without(mut self, strategy: HealingStrategy) -> Self {
        self.0.remove(&strategy);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = HealingStrategy> + '_ {
        self.0.iter().copied()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|strategy| strategy.name()).collect()
    }
}

impl Default for EnabledStrategies {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<HealingStrategy> for EnabledStrategies {
    fn from_iter<T: IntoIterator<Item = HealingStrategy>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
