//! Opportunity ranking and selection.

use super::opportunity::{Opportunity, Thresholds};

/// Opportunities clearing their threshold, best net return first.
///
/// Ties keep the earlier `discovered_at` first; the sort is stable, so
/// anything still tied keeps input order.
pub fn rank(opportunities: Vec<Opportunity>, thresholds: &Thresholds) -> Vec<Opportunity> {
    let mut ranked: Vec<Opportunity> = opportunities
        .into_iter()
        .filter(|o| thresholds.clears(o.kind, o.net_profit_pct))
        .collect();
    ranked.sort_by(|a, b| {
        b.net_profit_pct
            .cmp(&a.net_profit_pct)
            .then_with(|| a.discovered_at.cmp(&b.discovered_at))
    });
    ranked
}

/// Best opportunity to execute, or `None` when nothing clears its threshold
/// or `active` has already reached `max_concurrent`.
pub fn select(
    opportunities: Vec<Opportunity>,
    active: usize,
    max_concurrent: usize,
    thresholds: &Thresholds,
) -> Option<Opportunity> {
    if active >= max_concurrent {
        return None;
    }
    rank(opportunities, thresholds).into_iter().next()
}
