//! Tilt detection from loss streaks, risk escalation and overtrading.
//!
//! Each signal is `None` when it could not be evaluated (for example fewer
//! closed trades than the risk lookback). A signal that was evaluated and
//! found nothing carries [`Severity::None`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::analytics::equity::chronological_closed;
use crate::analytics::stats::Outcome;
use crate::analytics::streaks::Streaks;
use crate::time::{day_key, Timezone};
use crate::types::Position;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Elevated,
    High,
}

/// Trigger levels for each signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiltThresholds {
    /// Consecutive losses that raise the streak signal
    pub loss_streak: usize,
    pub loss_streak_high: usize,
    /// How many recent closed trades feed the risk signal
    pub risk_lookback: usize,
    /// Mean risk percent strictly above which risk is elevated
    pub mean_risk_percent: f64,
    pub mean_risk_percent_high: f64,
    /// Opens on one day strictly above which overtrading is flagged
    pub daily_opens: usize,
    pub daily_opens_high: usize,
}

impl Default for TiltThresholds {
    fn default() -> Self {
        Self {
            loss_streak: 3,
            loss_streak_high: 5,
            risk_lookback: 5,
            mean_risk_percent: 2.5,
            mean_risk_percent_high: 3.5,
            daily_opens: 5,
            daily_opens_high: 8,
        }
    }
}

/// Losing-run signal.
///
/// Severity follows the run still open at the latest close. `longest` is
/// context only: a past run that has since been broken by a win or a
/// breakeven does not raise severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossStreakSignal {
    pub current: usize,
    pub longest: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEscalationSignal {
    pub mean_risk_percent: f64,
    pub sample: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OvertradingSignal {
    /// Busiest local day
    pub day: String,
    pub opens: usize,
    pub severity: Severity,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TiltReport {
    pub loss_streak: Option<LossStreakSignal>,
    pub risk_escalation: Option<RiskEscalationSignal>,
    pub overtrading: Option<OvertradingSignal>,
    /// Highest severity over the evaluated signals
    pub level: Severity,
}

/// Evaluate every tilt signal.
///
/// All three signals look at closed positions only. Streak and risk walk them
/// in close order; overtrading counts their opens per local day.
pub fn detect_tilt(
    positions: &[&Position],
    be_threshold: f64,
    tz: &Timezone,
    thresholds: &TiltThresholds,
) -> TiltReport {
    let closed = chronological_closed(positions);

    let loss_streak = loss_streak_signal(&closed, be_threshold, thresholds);
    let risk_escalation = risk_escalation_signal(&closed, thresholds);
    let overtrading = overtrading_signal(&closed, tz, thresholds);

    let level = [
        loss_streak.as_ref().map(|s| s.severity),
        risk_escalation.as_ref().map(|s| s.severity),
        overtrading.as_ref().map(|s| s.severity),
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or_default();

    if level > Severity::None {
        tracing::warn!("Tilt level {:?} over {} positions", level, positions.len());
    }

    TiltReport {
        loss_streak,
        risk_escalation,
        overtrading,
        level,
    }
}

fn loss_streak_signal(
    closed: &[&Position],
    be_threshold: f64,
    thresholds: &TiltThresholds,
) -> Option<LossStreakSignal> {
    if closed.is_empty() {
        return None;
    }
    let outcomes: Vec<Outcome> = closed
        .iter()
        .filter_map(|p| Outcome::of(p, be_threshold))
        .collect();
    let streaks = Streaks::from_outcomes(&outcomes);

    let severity = if streaks.current_loss >= thresholds.loss_streak_high {
        Severity::High
    } else if streaks.current_loss >= thresholds.loss_streak {
        Severity::Elevated
    } else {
        Severity::None
    };

    Some(LossStreakSignal {
        current: streaks.current_loss,
        longest: streaks.longest_loss,
        severity,
    })
}

fn risk_escalation_signal(
    closed: &[&Position],
    thresholds: &TiltThresholds,
) -> Option<RiskEscalationSignal> {
    let lookback = thresholds.risk_lookback;
    if lookback == 0 || closed.len() < lookback {
        return None;
    }
    let recent: Vec<f64> = closed[closed.len() - lookback..]
        .iter()
        .filter_map(|p| p.risk_percent)
        .collect();
    // a recent trade without a stop leaves the mean unknown
    if recent.len() < lookback {
        return None;
    }

    let mean = recent.iter().sum::<f64>() / recent.len() as f64;
    let severity = if mean > thresholds.mean_risk_percent_high {
        Severity::High
    } else if mean > thresholds.mean_risk_percent {
        Severity::Elevated
    } else {
        Severity::None
    };

    Some(RiskEscalationSignal {
        mean_risk_percent: mean,
        sample: recent.len(),
        severity,
    })
}

fn overtrading_signal(
    closed: &[&Position],
    tz: &Timezone,
    thresholds: &TiltThresholds,
) -> Option<OvertradingSignal> {
    let mut per_day: HashMap<String, usize> = HashMap::new();
    for position in closed {
        *per_day.entry(day_key(&position.date_open, tz)).or_default() += 1;
    }

    // earliest day wins a tie
    let (day, opens) = per_day
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))?;

    let severity = if opens > thresholds.daily_opens_high {
        Severity::High
    } else if opens > thresholds.daily_opens {
        Severity::Elevated
    } else {
        Severity::None
    };

    Some(OvertradingSignal {
        day,
        opens,
        severity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::{closed_at, closed_between, open_at, sequence};
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn tilt(positions: &[Position]) -> TiltReport {
        let refs: Vec<&Position> = positions.iter().collect();
        detect_tilt(&refs, 0.5, &Timezone::utc(), &TiltThresholds::default())
    }

    #[test]
    fn test_empty_input_evaluates_nothing() {
        let report = tilt(&[]);
        assert!(report.loss_streak.is_none());
        assert!(report.risk_escalation.is_none());
        assert!(report.overtrading.is_none());
        assert_eq!(report.level, Severity::None);
    }

    #[test]
    fn test_loss_streak_levels() {
        let report = tilt(&sequence(&[100.0, -10.0, -10.0]));
        let streak = report.loss_streak.unwrap();
        assert_eq!(streak.current, 2);
        assert_eq!(streak.severity, Severity::None);

        let report = tilt(&sequence(&[100.0, -10.0, -10.0, -10.0]));
        assert_eq!(report.loss_streak.unwrap().severity, Severity::Elevated);
        assert_eq!(report.level, Severity::Elevated);

        let report = tilt(&sequence(&[-10.0; 5]));
        assert_eq!(report.loss_streak.unwrap().severity, Severity::High);
        assert_eq!(report.level, Severity::High);
    }

    #[test]
    fn test_loss_streak_uses_current_run() {
        let report = tilt(&sequence(&[-10.0, -10.0, -10.0, -10.0, 50.0]));
        let streak = report.loss_streak.unwrap();
        assert_eq!(streak.longest, 4);
        assert_eq!(streak.current, 0);
        assert_eq!(streak.severity, Severity::None);
    }

    #[test]
    fn test_risk_escalation_needs_full_lookback() {
        let report = tilt(&sequence(&[10.0, 10.0, 10.0, 10.0]));
        assert!(report.risk_escalation.is_none());
    }

    #[test]
    fn test_risk_escalation_levels() {
        let mut positions = sequence(&[10.0; 6]);
        // the oldest trade falls outside the lookback
        positions[0].risk_percent = Some(50.0);
        for (i, p) in positions.iter_mut().skip(1).enumerate() {
            p.risk_percent = Some(2.0 + i as f64 * 0.5);
        }

        let report = tilt(&positions);
        let signal = report.risk_escalation.unwrap();
        assert_eq!(signal.sample, 5);
        assert_relative_eq!(signal.mean_risk_percent, 3.0, epsilon = 1e-9);
        assert_eq!(signal.severity, Severity::Elevated);

        for p in positions.iter_mut() {
            p.risk_percent = Some(4.0);
        }
        assert_eq!(tilt(&positions).risk_escalation.unwrap().severity, Severity::High);

        for p in positions.iter_mut() {
            p.risk_percent = Some(1.0);
        }
        assert_eq!(tilt(&positions).risk_escalation.unwrap().severity, Severity::None);
    }

    #[test]
    fn test_overtrading_levels() {
        let base = chrono::DateTime::parse_from_rfc3339("2024-03-04T08:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let opens = |n: usize| -> Vec<Position> {
            (0..n)
                .map(|i| {
                    let open = base + Duration::minutes(i as i64 * 10);
                    let close = open + Duration::minutes(5);
                    let id = format!("o{i}");
                    closed_between(&id, &open.to_rfc3339(), &close.to_rfc3339(), 1.0)
                })
                .collect()
        };

        let signal = tilt(&opens(5)).overtrading.unwrap();
        assert_eq!(signal.opens, 5);
        assert_eq!(signal.severity, Severity::None);

        let signal = tilt(&opens(6)).overtrading.unwrap();
        assert_eq!(signal.day, "2024-03-04");
        assert_eq!(signal.severity, Severity::Elevated);

        assert_eq!(tilt(&opens(9)).overtrading.unwrap().severity, Severity::High);
    }

    #[test]
    fn test_open_positions_not_evaluated() {
        let positions: Vec<Position> = (0..6)
            .map(|i| open_at(&format!("o{i}"), &format!("2024-03-04T0{i}:00:00Z")))
            .collect();

        let report = tilt(&positions);

        assert!(report.overtrading.is_none());
        assert!(report.loss_streak.is_none());
        assert_eq!(report.level, Severity::None);
    }

    #[test]
    fn test_overtrading_ignores_still_open_positions() {
        let mut positions: Vec<Position> = (0..5)
            .map(|i| closed_at(&format!("c{i}"), &format!("2024-03-04T1{i}:00:00Z"), 1.0))
            .collect();
        positions.push(open_at("late", "2024-03-04T20:00:00Z"));

        let signal = tilt(&positions).overtrading.unwrap();
        assert_eq!(signal.opens, 5);
        assert_eq!(signal.severity, Severity::None);
    }

    #[test]
    fn test_overtrading_counts_local_days() {
        // opens at 23:30 UTC on the 4th and 02:00 UTC on the 5th, both the 4th in UTC-5
        let positions = vec![
            closed_at("a", "2024-03-05T00:30:00Z", 10.0),
            closed_between("b", "2024-03-05T02:00:00Z", "2024-03-05T02:30:00Z", 5.0),
        ];
        let refs: Vec<&Position> = positions.iter().collect();
        let tz: Timezone = "UTC-5".parse().unwrap();

        let signal = detect_tilt(&refs, 0.5, &tz, &TiltThresholds::default())
            .overtrading
            .unwrap();
        assert_eq!(signal.day, "2024-03-04");
        assert_eq!(signal.opens, 2);
    }
}
