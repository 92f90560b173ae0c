//! Performance grouped by a position attribute.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::stats::Outcome;
use crate::types::{Position, Ratio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    Symbol,
    Strategy,
    Timeframe,
    Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub key: String,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub net_pnl_usd: f64,
    pub win_rate_percent: Ratio,
}

fn attribute_key(position: &Position, attribute: Attribute) -> String {
    let value = match attribute {
        Attribute::Symbol => Some(position.symbol.as_str()),
        Attribute::Strategy => position.strategy.as_deref(),
        Attribute::Timeframe => position.timeframe.as_deref(),
        Attribute::Direction => Some(position.direction.as_str()),
    };
    match value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => "unspecified".to_string(),
    }
}

/// Closed-position performance per attribute value, sorted by key.
pub fn breakdown_by(
    positions: &[&Position],
    attribute: Attribute,
    be_threshold: f64,
) -> Vec<Breakdown> {
    let mut groups: BTreeMap<String, (usize, usize, usize, f64)> = BTreeMap::new();

    for position in positions {
        let Some(pnl) = position.closed_pnl() else {
            continue;
        };
        let group = groups
            .entry(attribute_key(position, attribute))
            .or_insert((0, 0, 0, 0.0));
        group.0 += 1;
        group.3 += pnl;
        match Outcome::classify(pnl, be_threshold) {
            Outcome::Win => group.1 += 1,
            Outcome::Loss => group.2 += 1,
            Outcome::Breakeven => {}
        }
    }

    groups
        .into_iter()
        .map(|(key, (trades, wins, losses, net))| Breakdown {
            key,
            trades,
            wins,
            losses,
            net_pnl_usd: net,
            win_rate_percent: Ratio::from_parts(wins as f64 * 100.0, (wins + losses) as f64),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::closed_at;

    #[test]
    fn test_breakdown_by_strategy() {
        let mut a = closed_at("a", "2024-01-01T10:00:00Z", 100.0);
        a.strategy = Some("breakout".to_string());
        let mut b = closed_at("b", "2024-01-02T10:00:00Z", -50.0);
        b.strategy = Some("breakout".to_string());
        let c = closed_at("c", "2024-01-03T10:00:00Z", 0.1);

        let rows = breakdown_by(&[&a, &b, &c], Attribute::Strategy, 0.5);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "breakout");
        assert_eq!(rows[0].trades, 2);
        assert_eq!(rows[0].net_pnl_usd, 50.0);
        assert_eq!(rows[0].win_rate_percent, Ratio::Defined(50.0));
        assert_eq!(rows[1].key, "unspecified");
        assert_eq!(rows[1].win_rate_percent, Ratio::Undefined);
    }

    #[test]
    fn test_breakdown_by_direction() {
        let a = closed_at("a", "2024-01-01T10:00:00Z", 100.0);
        let rows = breakdown_by(&[&a], Attribute::Direction, 0.5);
        assert_eq!(rows[0].key, "long");
    }
}
