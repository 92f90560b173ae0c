//! Equity curve and drawdown.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Position;

/// Closed positions in chronological close order.
///
/// Ties on close time fall back to open time, then id, so the order never
/// depends on storage order.
pub fn chronological_closed<'a>(positions: &[&'a Position]) -> Vec<&'a Position> {
    let mut closed: Vec<&Position> = positions
        .iter()
        .copied()
        .filter(|p| p.closed_pnl().is_some())
        .collect();
    closed.sort_by(|a, b| compare_by_close(a, b));
    closed
}

fn compare_by_close(a: &Position, b: &Position) -> Ordering {
    a.reference_date()
        .cmp(&b.reference_date())
        .then_with(|| a.date_open.cmp(&b.date_open))
        .then_with(|| a.id.cmp(&b.id))
}

/// One point on the equity curve, after a position closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub position_id: String,
    pub pnl_usd: f64,
    pub balance: f64,
    pub peak: f64,
    pub drawdown_usd: f64,
    pub drawdown_percent: f64,
}

/// Cumulative balance over closed positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityCurve {
    pub starting_balance: f64,
    pub final_balance: f64,
    pub points: Vec<EquityPoint>,
    pub max_drawdown_usd: f64,
    /// Largest drawdown as a percent of the peak it fell from
    pub max_drawdown_percent: f64,
    /// Index into `points` where the absolute max drawdown was reached
    pub max_drawdown_index: Option<usize>,
}

impl EquityCurve {
    /// Walk `chronological` (already sorted, closed only) from `starting_balance`.
    pub fn build(chronological: &[&Position], starting_balance: f64) -> Self {
        let mut balance = starting_balance;
        let mut peak = starting_balance;
        let mut max_drawdown_usd = 0.0;
        let mut max_drawdown_percent = 0.0;
        let mut max_drawdown_index = None;
        let mut points = Vec::with_capacity(chronological.len());

        for (idx, position) in chronological.iter().enumerate() {
            let pnl = position.pnl_usd.unwrap_or(0.0);
            balance += pnl;
            if balance > peak {
                peak = balance;
            }

            let drawdown_usd = peak - balance;
            let drawdown_percent = if peak > 0.0 {
                drawdown_usd / peak * 100.0
            } else {
                0.0
            };
            if drawdown_usd > max_drawdown_usd {
                max_drawdown_usd = drawdown_usd;
                max_drawdown_index = Some(idx);
            }
            if drawdown_percent > max_drawdown_percent {
                max_drawdown_percent = drawdown_percent;
            }

            points.push(EquityPoint {
                timestamp: position.reference_date(),
                position_id: position.id.clone(),
                pnl_usd: pnl,
                balance,
                peak,
                drawdown_usd,
                drawdown_percent,
            });
        }

        Self {
            starting_balance,
            final_balance: balance,
            points,
            max_drawdown_usd,
            max_drawdown_percent,
            max_drawdown_index,
        }
    }
}
