//! Behavioral detectors: revenge trading and tilt.
//!
//! Detectors are pure functions over a slice the caller has already sorted by
//! open time (see [`chronological_open`]). [`analyze_behavior`] does that sort
//! once and runs both.

pub mod revenge;
pub mod tilt;

pub use revenge::{
    detect_revenge_trades, RevengeFlag, RevengeReport, DEFAULT_REVENGE_WINDOW_MINUTES,
};
pub use tilt::{detect_tilt, Severity, TiltReport, TiltThresholds};

use serde::{Deserialize, Serialize};

use crate::time::Timezone;
use crate::types::Position;

/// Positions ordered by open time, ties broken by id.
pub fn chronological_open(positions: &[Position]) -> Vec<&Position> {
    let mut sorted: Vec<&Position> = positions.iter().collect();
    sorted.sort_by(|a, b| a.date_open.cmp(&b.date_open).then_with(|| a.id.cmp(&b.id)));
    sorted
}

/// Both detectors over one position list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorReport {
    pub revenge: RevengeReport,
    pub tilt: TiltReport,
}

pub fn analyze_behavior(
    positions: &[Position],
    window_minutes: i64,
    be_threshold: f64,
    tz: &Timezone,
    thresholds: &TiltThresholds,
) -> BehaviorReport {
    let sorted = chronological_open(positions);
    BehaviorReport {
        revenge: detect_revenge_trades(&sorted, window_minutes, be_threshold, tz),
        tilt: detect_tilt(&sorted, be_threshold, tz, thresholds),
    }
}
