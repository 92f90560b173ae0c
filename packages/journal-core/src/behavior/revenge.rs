//! Revenge-trade detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::{day_key, minutes_between, within_minutes, Timezone};
use crate::types::Position;

pub const DEFAULT_REVENGE_WINDOW_MINUTES: i64 = 30;

/// A position opened soon after a losing close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevengeFlag {
    pub position_id: String,
    pub loss_position_id: String,
    pub loss_pnl_usd: f64,
    /// Minutes from the loss closing to this position opening
    pub delta_minutes: i64,
    /// Local day the position was opened
    pub day: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevengeReport {
    pub flags: Vec<RevengeFlag>,
    pub count: usize,
    /// Flagged positions that are already closed
    pub closed_count: usize,
    /// Net PnL of the closed flagged positions
    pub total_pnl_usd: f64,
}

struct Loss<'a> {
    closed_at: DateTime<Utc>,
    position: &'a Position,
    pnl: f64,
}

/// Flag positions opened within `window_minutes` after a real loss closed.
///
/// `positions` must be sorted by open time. Only the nearest loss closed
/// strictly before a position opened is considered, so each position pairs
/// with at most one loss.
pub fn detect_revenge_trades(
    positions: &[&Position],
    window_minutes: i64,
    be_threshold: f64,
    tz: &Timezone,
) -> RevengeReport {
    let mut losses: Vec<Loss> = positions
        .iter()
        .filter_map(|&p| {
            let pnl = p.closed_pnl()?;
            let closed_at = p.date_close?;
            (pnl < -be_threshold).then_some(Loss {
                closed_at,
                position: p,
                pnl,
            })
        })
        .collect();
    losses.sort_by(|a, b| a.closed_at.cmp(&b.closed_at));

    let mut report = RevengeReport::default();

    for position in positions {
        let before = losses.partition_point(|l| l.closed_at < position.date_open);
        let Some(loss) = before.checked_sub(1).map(|i| &losses[i]) else {
            continue;
        };
        if !within_minutes(&position.date_open, &loss.closed_at, window_minutes) {
            continue;
        }

        let delta_minutes = minutes_between(&position.date_open, &loss.closed_at);
        tracing::debug!(
            "Revenge trade: {} opened {}m after loss {}",
            position.id,
            delta_minutes,
            loss.position.id
        );

        if let Some(pnl) = position.closed_pnl() {
            report.closed_count += 1;
            report.total_pnl_usd += pnl;
        }
        report.flags.push(RevengeFlag {
            position_id: position.id.clone(),
            loss_position_id: loss.position.id.clone(),
            loss_pnl_usd: loss.pnl,
            delta_minutes,
            day: day_key(&position.date_open, tz),
        });
    }

    report.count = report.flags.len();
    report
}
