//! Position ledger state machine.
//!
//! Every event is validated against the current snapshot first and only then
//! applied to a copy, so a rejected event never changes the caller's position.
//! Callers must serialize events per position id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::risk::{distance_usd, percent_of, RiskInputs, RiskReward};
use crate::time::{minutes_between, Clock, SystemClock};
use crate::types::{
    ActionEntry, ActionKind, CloseReason, Direction, FillRecord, Position, PositionStatus,
};
use crate::{Error, Result};

/// Default size below which a partially closed position counts as flat.
pub const DEFAULT_CLOSE_EPSILON: f64 = 1e-6;

/// PnL of moving `size_usd` of notional from `entry` to `exit`.
pub fn directional_pnl(entry: f64, exit: f64, size_usd: f64, direction: Direction) -> f64 {
    match direction {
        Direction::Long => (exit - entry) / entry * size_usd,
        Direction::Short => (entry - exit) / entry * size_usd,
    }
}

/// Where an R-multiple denominator came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBasisSource {
    MaxRisk,
    OriginalStop,
    /// No risk was ever defined; the basis is `1`.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskBasis {
    pub value: f64,
    pub source: RiskBasisSource,
}

impl RiskBasis {
    pub fn is_degenerate(&self) -> bool {
        self.source == RiskBasisSource::Fallback
    }
}

/// The worst risk the trader actually exposed on this position.
///
/// `max_risk_usd` when nonzero, else the stop distance at the original entry
/// and stop on the original size, else `1`.
pub fn risk_basis(position: &Position) -> RiskBasis {
    if position.max_risk_usd > 0.0 {
        return RiskBasis {
            value: position.max_risk_usd,
            source: RiskBasisSource::MaxRisk,
        };
    }

    let original = position
        .original_stop_price
        .filter(|_| position.original_entry_price > 0.0)
        .map(|stop| {
            distance_usd(
                position.original_entry_price,
                stop,
                position.original_size_usd,
            )
        })
        .filter(|risk| *risk > 0.0);

    match original {
        Some(value) => RiskBasis {
            value,
            source: RiskBasisSource::OriginalStop,
        },
        None => RiskBasis {
            value: 1.0,
            source: RiskBasisSource::Fallback,
        },
    }
}

/// Parameters of a position's first fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    #[serde(default)]
    pub id: Option<String>,
    pub symbol: String,
    pub direction: Direction,
    pub price: f64,
    pub size_usd: f64,
    #[serde(default)]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub take_price: Option<f64>,
    pub account_balance: f64,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    /// Defaults to the ledger clock
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
}

impl OpenPosition {
    pub fn new(
        symbol: &str,
        direction: Direction,
        price: f64,
        size_usd: f64,
        account_balance: f64,
    ) -> Self {
        Self {
            id: None,
            symbol: symbol.to_uppercase(),
            direction,
            price,
            size_usd,
            stop_price: None,
            take_price: None,
            account_balance,
            strategy: None,
            timeframe: None,
            opened_at: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_stop(mut self, stop: f64) -> Self {
        self.stop_price = Some(stop);
        self
    }

    pub fn with_take(mut self, take: f64) -> Self {
        self.take_price = Some(take);
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }

    pub fn opened_at(mut self, at: DateTime<Utc>) -> Self {
        self.opened_at = Some(at);
        self
    }
}

/// An event applied to an open position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Average into the position.
    Add { price: f64, size_usd: f64 },
    /// Close `percent` (0, 100] of the current size.
    PartialClose { percent: f64, price: f64 },
    StopAdjust { new_stop: f64 },
    /// `StopAdjust` to the current entry price.
    MoveToBreakeven,
    /// Set or clear the take-profit level.
    TakeAdjust { new_take: Option<f64> },
    Close { price: f64, reason: CloseReason },
    /// Close at stop/take if `price` crossed either, otherwise no-op.
    MarkPrice { price: f64 },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Add { .. } => "add",
            LedgerEvent::PartialClose { .. } => "partial_close",
            LedgerEvent::StopAdjust { .. } => "stop_adjust",
            LedgerEvent::MoveToBreakeven => "move_to_breakeven",
            LedgerEvent::TakeAdjust { .. } => "take_adjust",
            LedgerEvent::Close { .. } => "close",
            LedgerEvent::MarkPrice { .. } => "mark_price",
        }
    }
}

/// Applies ledger events to position snapshots.
#[derive(Debug, Clone)]
pub struct PositionLedger<C: Clock = SystemClock> {
    clock: C,
    close_epsilon: f64,
}

impl Default for PositionLedger<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> PositionLedger<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            close_epsilon: DEFAULT_CLOSE_EPSILON,
        }
    }

    /// Override the flat-size tolerance used by partial closes.
    pub fn with_close_epsilon(mut self, epsilon: f64) -> Self {
        self.close_epsilon = epsilon.abs();
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Create a position from its first fill.
    pub fn open(&self, request: OpenPosition) -> Result<Position> {
        require_positive("entry price", request.price)?;
        require_positive("position size", request.size_usd)?;
        require_positive("account balance", request.account_balance)?;
        if let Some(stop) = request.stop_price {
            require_positive("stop price", stop)?;
        }
        if let Some(take) = request.take_price {
            require_positive("take price", take)?;
        }

        let now = self.clock.now();
        let opened_at = request.opened_at.unwrap_or(now);
        let id = request
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut position = Position {
            id,
            symbol: request.symbol.to_uppercase(),
            direction: request.direction,
            strategy: request.strategy,
            timeframe: request.timeframe,
            entry_price: request.price,
            position_size_usd: request.size_usd,
            stop_price: request.stop_price,
            take_price: request.take_price,
            original_entry_price: request.price,
            original_stop_price: request.stop_price,
            original_size_usd: request.size_usd,
            risk_usd: None,
            risk_percent: None,
            max_risk_usd: 0.0,
            reward_usd: None,
            reward_percent: None,
            rr_ratio: Default::default(),
            realized_pnl_usd: 0.0,
            account_balance_at_entry: request.account_balance,
            status: PositionStatus::Open,
            date_open: opened_at,
            date_close: None,
            close_price: None,
            close_reason: None,
            pnl_usd: None,
            pnl_percent: None,
            r_multiple: None,
            r_multiple_degenerate: false,
            duration_minutes: None,
            adds: Vec::new(),
            partial_closes: Vec::new(),
            action_history: Vec::new(),
            notes: None,
            tags: Vec::new(),
        };
        recompute_risk(&mut position)?;

        let description = format!(
            "Opened {} {} {} @ {}, stop {}, take {}",
            position.direction.as_str().to_uppercase(),
            position.symbol,
            usd(position.position_size_usd),
            price(position.entry_price),
            opt_price(position.stop_price),
            opt_price(position.take_price),
        );
        append(&mut position, opened_at, ActionKind::Open, description);

        tracing::debug!("Position opened: {} ({})", position.id, position.symbol);
        Ok(position)
    }

    /// Apply `event` to `position`, returning the updated snapshot.
    pub fn apply(&self, position: &Position, event: LedgerEvent) -> Result<Position> {
        let result = self.transition(position, event);
        match &result {
            Ok(updated) => tracing::debug!(
                "Applied {} to position {} (status {:?})",
                event.name(),
                updated.id,
                updated.status
            ),
            Err(e) => tracing::warn!(
                "Rejected {} on position {}: {}",
                event.name(),
                position.id,
                e
            ),
        }
        result
    }

    pub fn add(&self, position: &Position, price: f64, size_usd: f64) -> Result<Position> {
        self.apply(position, LedgerEvent::Add { price, size_usd })
    }

    pub fn partial_close(&self, position: &Position, percent: f64, price: f64) -> Result<Position> {
        self.apply(position, LedgerEvent::PartialClose { percent, price })
    }

    pub fn adjust_stop(&self, position: &Position, new_stop: f64) -> Result<Position> {
        self.apply(position, LedgerEvent::StopAdjust { new_stop })
    }

    pub fn move_to_breakeven(&self, position: &Position) -> Result<Position> {
        self.apply(position, LedgerEvent::MoveToBreakeven)
    }

    pub fn close(&self, position: &Position, price: f64, reason: CloseReason) -> Result<Position> {
        self.apply(position, LedgerEvent::Close { price, reason })
    }

    pub fn mark_price(&self, position: &Position, price: f64) -> Result<Position> {
        self.apply(position, LedgerEvent::MarkPrice { price })
    }

    fn transition(&self, position: &Position, event: LedgerEvent) -> Result<Position> {
        if position.is_closed() {
            return Err(Error::InvalidTransition(format!(
                "cannot apply {} to closed position {}",
                event.name(),
                position.id
            )));
        }

        match event {
            LedgerEvent::Add { price, size_usd } => self.apply_add(position, price, size_usd),
            LedgerEvent::PartialClose { percent, price } => {
                self.apply_partial_close(position, percent, price)
            }
            LedgerEvent::StopAdjust { new_stop } => self.apply_stop_adjust(position, new_stop),
            LedgerEvent::MoveToBreakeven => {
                self.apply_stop_adjust(position, position.entry_price)
            }
            LedgerEvent::TakeAdjust { new_take } => self.apply_take_adjust(position, new_take),
            LedgerEvent::Close { price, reason } => self.apply_close(position, price, reason),
            LedgerEvent::MarkPrice { price } => self.apply_mark_price(position, price),
        }
    }

    fn apply_add(&self, position: &Position, fill_price: f64, size_usd: f64) -> Result<Position> {
        require_positive("add price", fill_price)?;
        require_positive("add size", size_usd)?;

        let mut next = position.clone();
        let total_size = position.position_size_usd + size_usd;
        next.entry_price = (position.entry_price * position.position_size_usd
            + fill_price * size_usd)
            / total_size;
        next.position_size_usd = total_size;
        recompute_risk(&mut next)?;

        let now = self.clock.now();
        next.adds.push(FillRecord {
            timestamp: now,
            price: fill_price,
            size_usd,
            pnl_usd: None,
        });
        let description = format!(
            "Added {} @ {} -> avg entry {}, size {}",
            usd(size_usd),
            price(fill_price),
            price(next.entry_price),
            usd(next.position_size_usd),
        );
        append(&mut next, now, ActionKind::Add, description);
        Ok(next)
    }

    fn apply_partial_close(
        &self,
        position: &Position,
        percent: f64,
        exit_price: f64,
    ) -> Result<Position> {
        require_positive("close price", exit_price)?;
        if !percent.is_finite() || percent <= 0.0 || percent > 100.0 {
            return Err(Error::InvalidPositionState(format!(
                "partial close percent must be in (0, 100], got {}",
                percent
            )));
        }

        let mut next = position.clone();
        let closed_size = position.position_size_usd * percent / 100.0;
        let partial_pnl = directional_pnl(
            position.entry_price,
            exit_price,
            closed_size,
            position.direction,
        );
        next.realized_pnl_usd += partial_pnl;
        next.position_size_usd = position.position_size_usd - closed_size;

        let now = self.clock.now();
        next.partial_closes.push(FillRecord {
            timestamp: now,
            price: exit_price,
            size_usd: closed_size,
            pnl_usd: Some(partial_pnl),
        });
        let description = format!(
            "Closed {}% ({}) @ {}, PnL {}",
            trim_float(percent),
            usd(closed_size),
            price(exit_price),
            signed_usd(partial_pnl),
        );
        append(&mut next, now, ActionKind::PartialClose, description);

        if next.position_size_usd <= self.close_epsilon {
            next.position_size_usd = 0.0;
            let total = next.realized_pnl_usd;
            self.finalize(&mut next, exit_price, CloseReason::Reduced, total);
        } else {
            recompute_risk(&mut next)?;
        }
        Ok(next)
    }

    fn apply_stop_adjust(&self, position: &Position, new_stop: f64) -> Result<Position> {
        require_positive("stop price", new_stop)?;

        let mut next = position.clone();
        next.stop_price = Some(new_stop);
        recompute_risk(&mut next)?;

        let breakeven = new_stop == position.entry_price;
        let description = format!(
            "Stop {} -> {}{}",
            opt_price(position.stop_price),
            price(new_stop),
            if breakeven { " (breakeven)" } else { "" },
        );
        append(&mut next, self.clock.now(), ActionKind::StopAdjust, description);
        Ok(next)
    }

    fn apply_take_adjust(&self, position: &Position, new_take: Option<f64>) -> Result<Position> {
        if let Some(take) = new_take {
            require_positive("take price", take)?;
        }

        let mut next = position.clone();
        next.take_price = new_take;
        recompute_risk(&mut next)?;

        let description = format!(
            "Take {} -> {}",
            opt_price(position.take_price),
            opt_price(new_take),
        );
        append(&mut next, self.clock.now(), ActionKind::TakeAdjust, description);
        Ok(next)
    }

    fn apply_close(
        &self,
        position: &Position,
        exit_price: f64,
        reason: CloseReason,
    ) -> Result<Position> {
        require_positive("close price", exit_price)?;

        let mut next = position.clone();
        let pnl = position.realized_pnl_usd
            + directional_pnl(
                position.entry_price,
                exit_price,
                position.position_size_usd,
                position.direction,
            );
        self.finalize(&mut next, exit_price, reason, pnl);
        Ok(next)
    }

    fn apply_mark_price(&self, position: &Position, mark: f64) -> Result<Position> {
        require_positive("mark price", mark)?;

        let long = position.direction == Direction::Long;
        let stop_hit = position
            .stop_price
            .filter(|stop| if long { mark <= *stop } else { mark >= *stop });
        let take_hit = position
            .take_price
            .filter(|take| if long { mark >= *take } else { mark <= *take });

        match (stop_hit, take_hit) {
            (Some(stop), _) => self.apply_close(position, stop, CloseReason::HitStop),
            (None, Some(take)) => self.apply_close(position, take, CloseReason::HitTake),
            (None, None) => Ok(position.clone()),
        }
    }

    fn finalize(&self, position: &mut Position, exit_price: f64, reason: CloseReason, pnl: f64) {
        let now = self.clock.now();
        let basis = risk_basis(position);
        if basis.is_degenerate() {
            tracing::warn!(
                "Position {} closed without any defined risk; R-multiple uses a basis of 1",
                position.id
            );
        }

        position.status = PositionStatus::Closed;
        position.close_price = Some(exit_price);
        position.close_reason = Some(reason);
        position.date_close = Some(now);
        position.pnl_usd = Some(pnl);
        position.pnl_percent = Some(percent_of(pnl, position.account_balance_at_entry));
        position.r_multiple = Some(pnl / basis.value);
        position.r_multiple_degenerate = basis.is_degenerate();
        position.duration_minutes = Some(minutes_between(&now, &position.date_open));

        let description = format!(
            "{} @ {}, PnL {} ({:+.2}R)",
            reason.label(),
            price(exit_price),
            signed_usd(pnl),
            pnl / basis.value,
        );
        append(position, now, ActionKind::Close, description);
    }
}

/// Recompute risk/reward from the current entry, size, stop and take, and
/// raise the risk high-water mark.
fn recompute_risk(position: &mut Position) -> Result<()> {
    let rr = RiskReward::calculate(&RiskInputs {
        entry: position.entry_price,
        size_usd: position.position_size_usd,
        stop: position.stop_price,
        take: position.take_price,
        balance: position.account_balance_at_entry,
        basis_risk_usd: position.max_risk_usd,
    })?;

    position.risk_usd = rr.risk_usd;
    position.risk_percent = rr.risk_percent;
    position.reward_usd = rr.reward_usd;
    position.reward_percent = rr.reward_percent;
    position.rr_ratio = rr.rr_ratio;
    if let Some(risk) = rr.risk_usd {
        position.max_risk_usd = position.max_risk_usd.max(risk);
    }
    Ok(())
}

fn append(
    position: &mut Position,
    timestamp: DateTime<Utc>,
    kind: ActionKind,
    description: String,
) {
    position.action_history.push(ActionEntry {
        timestamp,
        kind,
        description,
    });
}

fn require_positive(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidPositionState(format!(
            "{} must be positive, got {}",
            what, value
        )))
    }
}

fn usd(value: f64) -> String {
    format!("${:.2}", value)
}

fn signed_usd(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", value.abs())
    } else {
        format!("+${:.2}", value)
    }
}

fn price(value: f64) -> String {
    trim_float(value)
}

fn opt_price(value: Option<f64>) -> String {
    value.map(price).unwrap_or_else(|| "none".to_string())
}

fn trim_float(value: f64) -> String {
    let s = format!("{:.8}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
