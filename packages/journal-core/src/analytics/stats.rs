//! Win/loss classification and trade statistics.

use serde::{Deserialize, Serialize};

use crate::types::{Position, Ratio};

/// PnL magnitude (USD) below which a closed trade counts as breakeven.
pub const DEFAULT_BE_THRESHOLD: f64 = 0.5;

/// Outcome of a closed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    Breakeven,
}

impl Outcome {
    pub fn classify(pnl: f64, be_threshold: f64) -> Self {
        if pnl > be_threshold {
            Outcome::Win
        } else if pnl < -be_threshold {
            Outcome::Loss
        } else {
            Outcome::Breakeven
        }
    }

    /// Outcome of a closed position, `None` while open or without PnL.
    pub fn of(position: &Position, be_threshold: f64) -> Option<Self> {
        position
            .closed_pnl()
            .map(|pnl| Self::classify(pnl, be_threshold))
    }
}

/// Aggregate trade statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub open_trades: usize,
    pub closed_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakevens: usize,
    /// Wins / (wins + losses), as a percent
    pub win_rate_percent: Ratio,
    /// Gross profit / |gross loss|
    pub profit_factor: Ratio,
    /// Mean PnL per closed trade, breakevens included
    pub expectancy_usd: Ratio,
    pub gross_profit_usd: f64,
    pub gross_loss_usd: f64,
    pub net_pnl_usd: f64,
    pub average_win_usd: Option<f64>,
    pub average_loss_usd: Option<f64>,
    pub largest_win_usd: Option<f64>,
    pub largest_loss_usd: Option<f64>,
    /// Mean R-multiple over closed trades with a non-degenerate basis
    pub average_r: Option<f64>,
    pub return_percent: Ratio,
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl TradeStats {
    /// Calculate statistics over `positions` (any order).
    pub fn calculate(positions: &[&Position], be_threshold: f64, starting_balance: f64) -> Self {
        let mut win_pnls = Vec::new();
        let mut loss_pnls = Vec::new();
        let mut breakevens = 0;
        let mut closed_pnls = Vec::new();
        let mut r_multiples = Vec::new();

        for position in positions {
            let Some(pnl) = position.closed_pnl() else {
                continue;
            };
            closed_pnls.push(pnl);
            match Outcome::classify(pnl, be_threshold) {
                Outcome::Win => win_pnls.push(pnl),
                Outcome::Loss => loss_pnls.push(pnl),
                Outcome::Breakeven => breakevens += 1,
            }
            if let Some(r) = position.r_multiple.filter(|_| !position.r_multiple_degenerate) {
                r_multiples.push(r);
            }
        }

        let gross_profit: f64 = win_pnls.iter().sum();
        let gross_loss: f64 = loss_pnls.iter().sum();
        let net_pnl: f64 = closed_pnls.iter().sum();
        let decided = win_pnls.len() + loss_pnls.len();

        let profit_factor = if loss_pnls.is_empty() {
            Ratio::Undefined
        } else {
            Ratio::from_parts(gross_profit, gross_loss.abs())
        };

        Self {
            total_trades: positions.len(),
            open_trades: positions.iter().filter(|p| p.is_open()).count(),
            closed_trades: closed_pnls.len(),
            wins: win_pnls.len(),
            losses: loss_pnls.len(),
            breakevens,
            win_rate_percent: Ratio::from_parts(win_pnls.len() as f64 * 100.0, decided as f64),
            profit_factor,
            expectancy_usd: Ratio::from_parts(net_pnl, closed_pnls.len() as f64),
            gross_profit_usd: gross_profit,
            gross_loss_usd: gross_loss,
            net_pnl_usd: net_pnl,
            average_win_usd: mean(&win_pnls),
            average_loss_usd: mean(&loss_pnls),
            largest_win_usd: win_pnls.iter().copied().reduce(f64::max),
            largest_loss_usd: loss_pnls.iter().copied().reduce(f64::min),
            average_r: mean(&r_multiples),
            return_percent: Ratio::from_parts(net_pnl * 100.0, starting_balance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::{closed_at, open_at, sequence};
    use approx::assert_relative_eq;

    #[test]
    fn test_classify() {
        assert_eq!(Outcome::classify(0.51, 0.5), Outcome::Win);
        assert_eq!(Outcome::classify(0.5, 0.5), Outcome::Breakeven);
        assert_eq!(Outcome::classify(-0.5, 0.5), Outcome::Breakeven);
        assert_eq!(Outcome::classify(-0.51, 0.5), Outcome::Loss);
    }

    #[test]
    fn test_profit_factor_and_win_rate() {
        let positions = sequence(&[100.0, -50.0, -50.0, -50.0, 200.0]);
        let refs: Vec<&Position> = positions.iter().collect();

        let stats = TradeStats::calculate(&refs, DEFAULT_BE_THRESHOLD, 10_000.0);

        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 3);
        assert_relative_eq!(stats.profit_factor.value().unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(stats.win_rate_percent.value().unwrap(), 40.0, epsilon = 1e-9);
        assert_relative_eq!(stats.expectancy_usd.value().unwrap(), 30.0, epsilon = 1e-9);
        assert_relative_eq!(stats.net_pnl_usd, 150.0, epsilon = 1e-9);
        assert_relative_eq!(stats.return_percent.value().unwrap(), 1.5, epsilon = 1e-9);
        assert_eq!(stats.largest_win_usd, Some(200.0));
        assert_eq!(stats.largest_loss_usd, Some(-50.0));
        assert_relative_eq!(stats.average_loss_usd.unwrap(), -50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_breakevens_excluded_from_win_rate() {
        let positions = sequence(&[100.0, 0.2, -0.4, -50.0]);
        let refs: Vec<&Position> = positions.iter().collect();

        let stats = TradeStats::calculate(&refs, DEFAULT_BE_THRESHOLD, 10_000.0);

        assert_eq!(stats.breakevens, 2);
        assert_relative_eq!(stats.win_rate_percent.value().unwrap(), 50.0, epsilon = 1e-9);
        // expectancy still counts breakevens
        assert_relative_eq!(
            stats.expectancy_usd.value().unwrap(),
            (100.0 + 0.2 - 0.4 - 50.0) / 4.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_undefined_metrics() {
        let positions = sequence(&[100.0, 20.0]);
        let refs: Vec<&Position> = positions.iter().collect();
        let stats = TradeStats::calculate(&refs, DEFAULT_BE_THRESHOLD, 10_000.0);
        assert_eq!(stats.profit_factor, Ratio::Undefined);

        let stats = TradeStats::calculate(&[], DEFAULT_BE_THRESHOLD, 10_000.0);
        assert_eq!(stats.win_rate_percent, Ratio::Undefined);
        assert_eq!(stats.expectancy_usd, Ratio::Undefined);
        assert!(stats.average_win_usd.is_none());
    }

    #[test]
    fn test_open_positions_counted_but_not_scored() {
        let open = open_at("o", "2024-01-01T09:00:00Z");
        let closed = closed_at("c", "2024-01-01T12:00:00Z", 25.0);
        let stats = TradeStats::calculate(&[&open, &closed], DEFAULT_BE_THRESHOLD, 1000.0);

        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.open_trades, 1);
        assert_eq!(stats.closed_trades, 1);
        assert_relative_eq!(stats.average_r.unwrap(), 0.5, epsilon = 1e-9);
    }
}
