//! Position filtering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::time::Timezone;
use crate::types::{Direction, Position};

/// Which positions a report covers by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Open,
    Closed,
}

/// Filter applied before aggregation.
///
/// Dates are local calendar days in the report timezone, both inclusive.
/// Empty allow-lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub status: StatusFilter,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub strategies: Vec<String>,
    #[serde(default)]
    pub timeframes: Vec<String>,
    #[serde(default)]
    pub directions: Vec<Direction>,
}

fn allowed(list: &[String], value: Option<&str>) -> bool {
    list.is_empty()
        || value.is_some_and(|v| list.iter().any(|item| item.eq_ignore_ascii_case(v)))
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn with_symbols(mut self, symbols: &[&str]) -> Self {
        self.symbols = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Whether `position` passes every criterion.
    pub fn matches(&self, position: &Position, tz: &Timezone) -> bool {
        let day = tz.local_date(&position.reference_date());
        if self.from.is_some_and(|from| day < from) || self.to.is_some_and(|to| day > to) {
            return false;
        }

        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Closed => position.close_price.is_some(),
            StatusFilter::Open => position.close_price.is_none(),
        };

        status_ok
            && allowed(&self.symbols, Some(&position.symbol))
            && allowed(&self.strategies, position.strategy.as_deref())
            && allowed(&self.timeframes, position.timeframe.as_deref())
            && (self.directions.is_empty() || self.directions.contains(&position.direction))
    }

    /// Positions that pass the filter, in input order.
    pub fn apply<'a>(&self, positions: &'a [Position], tz: &Timezone) -> Vec<&'a Position> {
        positions.iter().filter(|p| self.matches(p, tz)).collect()
    }
}
