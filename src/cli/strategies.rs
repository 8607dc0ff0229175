use action_locator::{HealingStrategy, ALIAS_TABLE};
use anyhow::Result;
use serde::Serialize;

use super::context::CliContext;

#[derive(Debug, Serialize)]
pub struct StrategyRow {
    pub strategy: &'static str,
    pub enabled: bool,
    pub aliases: Vec<&'static str>,
}

/// One row per canonical strategy, with the tags that resolve to it
pub fn strategy_rows(enabled_tags: &[String]) -> Vec<StrategyRow> {
    let (enabled, _) = action_locator::EnabledStrategies::from_tags(enabled_tags);
    HealingStrategy::all()
        .into_iter()
        .map(|strategy| StrategyRow {
            strategy: strategy.name(),
            enabled: enabled.contains(strategy),
            aliases: ALIAS_TABLE
                .iter()
                .filter(|(tag, target)| *target == strategy && *tag != strategy.name())
                .map(|(tag, _)| *tag)
                .collect(),
        })
        .collect()
}

pub fn cmd_strategies(ctx: &CliContext) -> Result<()> {
    let rows = strategy_rows(&ctx.config().healing.enabled_strategies);
    if let Some(rendered) = ctx.output().render(&rows)? {
        println!("{rendered}");
        return Ok(());
    }

    println!("{:<18} {:<8} ALIASES", "STRATEGY", "ENABLED");
    for row in rows {
        println!(
            "{:<18} {:<8} {}",
            row.strategy,
            if row.enabled { "yes" } else { "no" },
            row.aliases.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_follow_the_alias_table() {
        let rows = strategy_rows(&["id".to_string(), "visual".to_string()]);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].strategy, "selector_fallback");
        assert!(rows[0].enabled);
        assert!(rows[0].aliases.contains(&"data-testid"));
        assert!(!rows[0].aliases.contains(&"selector_fallback"));
        assert!(!rows[2].enabled);
        assert!(rows[5].enabled);
        assert_eq!(rows[5].aliases, vec!["visual", "visual-match"]);
    }
}
