//! PnL bucketed by local calendar period.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::stats::Outcome;
use crate::time::{day_key, month_key, week_key, Timezone};
use crate::types::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    /// Keyed by the Monday that starts the ISO week
    Week,
    Month,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodPnl {
    pub key: String,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub pnl_usd: f64,
}

/// Closed-position PnL per period of the close date in `tz`, oldest first.
///
/// Closed positions without a close date are skipped.
pub fn period_pnl(
    positions: &[&Position],
    period: Period,
    tz: &Timezone,
    be_threshold: f64,
) -> Vec<PeriodPnl> {
    let mut buckets: BTreeMap<String, PeriodPnl> = BTreeMap::new();

    for position in positions {
        let (Some(pnl), Some(closed_at)) = (position.closed_pnl(), position.date_close) else {
            continue;
        };
        let key = match period {
            Period::Day => day_key(&closed_at, tz),
            Period::Week => week_key(&closed_at, tz),
            Period::Month => month_key(&closed_at, tz),
        };

        let entry = buckets.entry(key.clone()).or_insert_with(|| PeriodPnl {
            key,
            trades: 0,
            wins: 0,
            losses: 0,
            pnl_usd: 0.0,
        });
        entry.trades += 1;
        entry.pnl_usd += pnl;
        match Outcome::classify(pnl, be_threshold) {
            Outcome::Win => entry.wins += 1,
            Outcome::Loss => entry.losses += 1,
            Outcome::Breakeven => {}
        }
    }

    buckets.into_values().collect()
}

/// Shorthand for [`period_pnl`] with [`Period::Day`].
pub fn daily_pnl(positions: &[&Position], tz: &Timezone, be_threshold: f64) -> Vec<PeriodPnl> {
    period_pnl(positions, Period::Day, tz, be_threshold)
}
