//! Core data types for the trading journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Trade direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

/// Lifecycle state of a position. `Closed` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    HitStop,
    HitTake,
    /// Partial closes reduced the size to zero.
    Reduced,
}

impl CloseReason {
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::Manual => "Closed",
            CloseReason::HitStop => "Hit Stop",
            CloseReason::HitTake => "Hit Take",
            CloseReason::Reduced => "Fully reduced",
        }
    }
}

/// Kind of entry in a position's action history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Open,
    Add,
    PartialClose,
    StopAdjust,
    TakeAdjust,
    Close,
}

/// One immutable line of a position's action history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: ActionKind,
    pub description: String,
}

/// An add or partial close fill, kept as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FillRecord {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub size_usd: f64,
    /// Realized PnL of this fill (partial closes only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pnl_usd: Option<f64>,
}

/// A ratio that may be structurally undefined.
///
/// `Degenerate` carries a value computed against the last-resort denominator
/// of `1`; it is displayable but should not be trusted as a real ratio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Ratio {
    Defined(f64),
    Degenerate(f64),
    #[default]
    Undefined,
}

impl Ratio {
    /// Build a ratio from a numerator and denominator, `Undefined` when the
    /// denominator is zero or either side is not finite.
    pub fn from_parts(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 || !numerator.is_finite() || !denominator.is_finite() {
            Ratio::Undefined
        } else {
            Ratio::Defined(numerator / denominator)
        }
    }

    /// The numeric value, failing with `UndefinedMetric` when not computed.
    pub fn value(&self) -> Result<f64> {
        match self {
            Ratio::Defined(v) | Ratio::Degenerate(v) => Ok(*v),
            Ratio::Undefined => Err(Error::UndefinedMetric(
                "ratio denominator is zero or missing".to_string(),
            )),
        }
    }

    pub fn as_option(&self) -> Option<f64> {
        self.value().ok()
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Ratio::Defined(_))
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Ratio::Degenerate(_))
    }
}

/// A single position from first fill to full close.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    /// Opaque identifier
    pub id: String,
    /// Instrument symbol (uppercase)
    pub symbol: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeframe: Option<String>,

    /// Current weighted-average entry price
    pub entry_price: f64,
    /// Current notional size in USD
    pub position_size_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stop_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub take_price: Option<f64>,
    /// Entry price of the first fill, never overwritten
    pub original_entry_price: f64,
    /// Stop price at the first fill, never overwritten
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original_stop_price: Option<f64>,
    /// Notional size of the first fill
    #[serde(default)]
    pub original_size_usd: f64,

    /// Risk at the current stop; `None` when there is no stop
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub risk_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub risk_percent: Option<f64>,
    /// High-water mark of `risk_usd`
    #[serde(default)]
    pub max_risk_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reward_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reward_percent: Option<f64>,
    #[serde(default)]
    pub rr_ratio: Ratio,

    /// Cumulative PnL from partial closes
    #[serde(default)]
    pub realized_pnl_usd: f64,
    /// Account size at open; percent denominator for the whole life
    pub account_balance_at_entry: f64,

    pub status: PositionStatus,
    pub date_open: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date_close: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub close_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub close_reason: Option<CloseReason>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pnl_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pnl_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub r_multiple: Option<f64>,
    /// Set when `r_multiple` was computed against the fallback basis of 1
    #[serde(default)]
    pub r_multiple_degenerate: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_minutes: Option<i64>,

    #[serde(default)]
    pub adds: Vec<FillRecord>,
    #[serde(default)]
    pub partial_closes: Vec<FillRecord>,
    #[serde(default)]
    pub action_history: Vec<ActionEntry>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// Close date if present, else open date.
    pub fn reference_date(&self) -> DateTime<Utc> {
        self.date_close.unwrap_or(self.date_open)
    }

    /// Final PnL of a closed position.
    pub fn closed_pnl(&self) -> Option<f64> {
        if self.is_closed() {
            self.pnl_usd
        } else {
            None
        }
    }
}

/// API response wrapper for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
