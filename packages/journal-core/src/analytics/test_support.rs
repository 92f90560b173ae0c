//! Position fixtures for analytics and behavior tests.

use chrono::{DateTime, Duration, Utc};

use crate::ledger::{OpenPosition, PositionLedger};
use crate::time::{parse_timestamp, FixedClock};
use crate::types::{CloseReason, Direction, Position};

fn ts(s: &str) -> DateTime<Utc> {
    parse_timestamp(s).unwrap()
}

fn opened(id: &str, at: DateTime<Utc>) -> Position {
    PositionLedger::new(FixedClock::new(at))
        .open(
            OpenPosition::new("BTC", Direction::Long, 100.0, 1000.0, 100_000.0)
                .with_id(id)
                .with_stop(95.0),
        )
        .unwrap()
}

/// Long BTC at 100, $1000, stop 95 (risk $50), open at `open_ts`.
pub fn open_at(id: &str, open_ts: &str) -> Position {
    opened(id, ts(open_ts))
}

/// Same shape as [`open_at`], closed at `close_ts` with exactly `pnl`.
///
/// `r_multiple` is `pnl / 50`.
pub fn closed_between(id: &str, open_ts: &str, close_ts: &str, pnl: f64) -> Position {
    let close_at = ts(close_ts);
    let position = opened(id, ts(open_ts));
    let mut closed = PositionLedger::new(FixedClock::new(close_at))
        .close(&position, 100.0, CloseReason::Manual)
        .unwrap();
    closed.pnl_usd = Some(pnl);
    closed.r_multiple = Some(pnl / 50.0);
    closed
}

/// Closed one hour after opening.
pub fn closed_at(id: &str, close_ts: &str, pnl: f64) -> Position {
    let open = ts(close_ts) - Duration::hours(1);
    closed_between(id, &open.to_rfc3339(), close_ts, pnl)
}

/// Positions `p0..pN` closing one day apart from 2024-01-01 in pnl order.
pub fn sequence(pnls: &[f64]) -> Vec<Position> {
    let start = ts("2024-01-01T12:00:00Z");
    pnls.iter()
        .enumerate()
        .map(|(i, pnl)| {
            let close = start + Duration::days(i as i64);
            closed_at(&format!("p{i}"), &close.to_rfc3339(), *pnl)
        })
        .collect()
}
