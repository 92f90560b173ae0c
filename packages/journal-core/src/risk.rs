//! Risk and reward calculation.
//!
//! Risk and reward are expressed in USD of notional size, as a percent of the
//! account balance at entry, and as a risk:reward ratio. A missing stop or
//! take yields `None`, never zero.

use serde::{Deserialize, Serialize};

use crate::types::Ratio;
use crate::{Error, Result};

/// Inputs to a risk/reward calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInputs {
    pub entry: f64,
    pub size_usd: f64,
    pub stop: Option<f64>,
    pub take: Option<f64>,
    pub balance: f64,
    /// Denominator for the breakeven-stop R:R fallback (the position's max risk)
    pub basis_risk_usd: f64,
}

/// Derived risk and reward figures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskReward {
    pub risk_usd: Option<f64>,
    pub risk_percent: Option<f64>,
    pub reward_usd: Option<f64>,
    pub reward_percent: Option<f64>,
    pub rr_ratio: Ratio,
}

/// USD distance between `entry` and `level` on `size_usd` of notional.
pub fn distance_usd(entry: f64, level: f64, size_usd: f64) -> f64 {
    (entry - level).abs() / entry * size_usd
}

/// Percent of `balance` that `amount` represents.
pub fn percent_of(amount: f64, balance: f64) -> f64 {
    amount / balance * 100.0
}

impl RiskReward {
    /// Calculate risk, reward and R:R.
    ///
    /// When the stop sits exactly at entry the risk is zero and the ratio
    /// falls back to `reward / basis_risk_usd`; if that basis is also zero
    /// the ratio is computed against `1` and marked `Degenerate`.
    pub fn calculate(inputs: &RiskInputs) -> Result<Self> {
        let RiskInputs {
            entry,
            size_usd,
            stop,
            take,
            balance,
            basis_risk_usd,
        } = *inputs;

        if !entry.is_finite() || entry <= 0.0 {
            return Err(Error::InvalidPositionState(format!(
                "entry price must be positive, got {}",
                entry
            )));
        }
        if !size_usd.is_finite() || size_usd < 0.0 {
            return Err(Error::InvalidPositionState(format!(
                "position size must be non-negative, got {}",
                size_usd
            )));
        }
        if !balance.is_finite() || balance <= 0.0 {
            return Err(Error::InvalidPositionState(format!(
                "account balance must be positive, got {}",
                balance
            )));
        }

        let risk_usd = stop.map(|s| distance_usd(entry, s, size_usd));
        let reward_usd = take.map(|t| distance_usd(entry, t, size_usd));

        let rr_ratio = match (risk_usd, reward_usd) {
            (Some(risk), Some(reward)) if risk > 0.0 => Ratio::Defined(reward / risk),
            (Some(_), Some(reward)) if basis_risk_usd > 0.0 => {
                Ratio::Defined(reward / basis_risk_usd)
            }
            (Some(_), Some(reward)) => Ratio::Degenerate(reward),
            _ => Ratio::Undefined,
        };

        Ok(Self {
            risk_usd,
            risk_percent: risk_usd.map(|r| percent_of(r, balance)),
            reward_usd,
            reward_percent: reward_usd.map(|r| percent_of(r, balance)),
            rr_ratio,
        })
    }
}
