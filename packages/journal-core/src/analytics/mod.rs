//! Performance analytics over a position list.
//!
//! Every aggregate here takes borrowed positions and never mutates them. The
//! chronological sort happens once in [`analyze`]; the equity curve, streaks
//! and calendar all walk that same sequence.

pub mod breakdown;
pub mod calendar;
pub mod distribution;
pub mod equity;
pub mod filter;
pub mod stats;
pub mod streaks;

#[cfg(test)]
pub(crate) mod test_support;

pub use breakdown::{breakdown_by, Attribute, Breakdown};
pub use calendar::{daily_pnl, period_pnl, Period, PeriodPnl};
pub use distribution::{RBucket, RDistribution};
pub use equity::{chronological_closed, EquityCurve, EquityPoint};
pub use filter::{FilterSpec, StatusFilter};
pub use stats::{Outcome, TradeStats, DEFAULT_BE_THRESHOLD};
pub use streaks::Streaks;

use serde::{Deserialize, Serialize};

use crate::time::Timezone;
use crate::types::Position;

/// Inputs shared by every aggregate in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsParams {
    pub starting_balance: f64,
    #[serde(default = "default_be_threshold")]
    pub be_threshold: f64,
    #[serde(default)]
    pub timezone: Timezone,
}

fn default_be_threshold() -> f64 {
    DEFAULT_BE_THRESHOLD
}

impl AnalyticsParams {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            starting_balance,
            be_threshold: DEFAULT_BE_THRESHOLD,
            timezone: Timezone::utc(),
        }
    }

    pub fn with_timezone(mut self, timezone: Timezone) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_be_threshold(mut self, be_threshold: f64) -> Self {
        self.be_threshold = be_threshold;
        self
    }
}

/// Full analytics report for one filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    /// Positions that passed the filter, open ones included
    pub filtered_count: usize,
    pub stats: TradeStats,
    pub equity: EquityCurve,
    pub streaks: Streaks,
    pub r_distribution: RDistribution,
    pub daily: Vec<PeriodPnl>,
}

/// Filter `positions`, then build every aggregate over the result.
pub fn analyze(
    positions: &[Position],
    filter: &FilterSpec,
    params: &AnalyticsParams,
) -> AnalyticsReport {
    let filtered = filter.apply(positions, &params.timezone);
    let chronological = chronological_closed(&filtered);

    let outcomes: Vec<Outcome> = chronological
        .iter()
        .filter_map(|p| Outcome::of(p, params.be_threshold))
        .collect();

    tracing::debug!(
        "Analytics over {} of {} positions ({} closed)",
        filtered.len(),
        positions.len(),
        chronological.len()
    );

    AnalyticsReport {
        filtered_count: filtered.len(),
        stats: TradeStats::calculate(&filtered, params.be_threshold, params.starting_balance),
        equity: EquityCurve::build(&chronological, params.starting_balance),
        streaks: Streaks::from_outcomes(&outcomes),
        r_distribution: RDistribution::from_positions(&chronological),
        daily: daily_pnl(&chronological, &params.timezone, params.be_threshold),
    }
}
