//! Selector candidate ranking

use std::cmp::Ordering;

use tracing::debug;

use crate::strategies::{EnabledStrategies, HealingStrategy};
use crate::types::{RankedCandidate, SelectorCandidate};

/// Order a failure event's candidates for the cascade.
///
/// Drops the failing selector itself, candidates whose strategy is disabled
/// or unknown, and candidates with a non-finite confidence. Confidences are
/// clamped to [0, 1]; the result is sorted by descending confidence and
/// keeps input order on ties.
pub fn rank_candidates(
    original_selector: &str,
    candidates: &[SelectorCandidate],
    enabled: &EnabledStrategies,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .filter(|candidate| candidate.selector != original_selector)
        .filter_map(|candidate| {
            let Some(strategy) = HealingStrategy::from_tag(&candidate.strategy) else {
                debug!(strategy = %candidate.strategy, "unknown strategy tag; candidate dropped");
                return None;
            };
            if !enabled.contains(strategy) {
                return None;
            }
            if !candidate.confidence.is_finite() {
                return None;
            }
            Some(RankedCandidate {
                selector: candidate.selector.clone(),
                strategy,
                confidence: candidate.confidence.clamp(0.0, 1.0),
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors(ranked: &[RankedCandidate]) -> Vec<&str> {
        ranked.iter().map(|c| c.selector.as_str()).collect()
    }

    #[test]
    fn sorts_descending_and_drops_original() {
        let candidates = vec![
            SelectorCandidate::new("#a", "id", 0.4),
            SelectorCandidate::new("#broken", "id", 0.99),
            SelectorCandidate::new("text=Buy", "text", 0.8),
            SelectorCandidate::new("[aria-label=Buy]", "aria-label", 0.6),
        ];
        let ranked = rank_candidates("#broken", &candidates, &EnabledStrategies::all());
        assert_eq!(selectors(&ranked), vec!["text=Buy", "[aria-label=Buy]", "#a"]);
        assert_eq!(ranked[0].strategy, HealingStrategy::TextMatch);
    }

    #[test]
    fn disabled_and_unknown_strategies_are_filtered() {
        let (enabled, _) = EnabledStrategies::from_tags(["selector_fallback"]);
        let candidates = vec![
            SelectorCandidate::new("#id", "id", 0.5),
            SelectorCandidate::new("//button", "xpath", 0.9),
            SelectorCandidate::new("?", "mystery", 1.0),
        ];
        let ranked = rank_candidates("#x", &candidates, &enabled);
        assert_eq!(selectors(&ranked), vec!["#id"]);
    }

    #[test]
    fn ties_keep_input_order_and_confidence_is_clamped() {
        let candidates = vec![
            SelectorCandidate::new("#first", "id", 0.7),
            SelectorCandidate::new("#second", "name", 0.7),
            SelectorCandidate::new("#nan", "id", f64::NAN),
            SelectorCandidate::new("#over", "id", 1.7),
        ];
        let ranked = rank_candidates("#x", &candidates, &EnabledStrategies::all());
        assert_eq!(selectors(&ranked), vec!["#over", "#first", "#second"]);
        assert_eq!(ranked[0].confidence, 1.0);
    }
}
