//! Journal Core - Position lifecycle and trading analytics engine.
//!
//! This crate provides the computational core of a personal trading journal:
//!
//! - **Temporal bucketing**: Timezone-correct day/week/month keys
//! - **Risk/reward**: Risk, reward and R:R from entry, stop, take and size
//! - **Position ledger**: Add, partial close, stop adjust and close transitions
//! - **Analytics**: Equity curve, drawdown, win rate, profit factor, streaks
//! - **Behavior detectors**: Revenge trading and tilt
//!
//! Everything here is a pure computation over its inputs. Persistence, auth
//! and rendering belong to the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use journal_core::{Direction, FixedClock, LedgerEvent, OpenPosition, PositionLedger};
//!
//! let ledger = PositionLedger::new(FixedClock::parse("2024-01-01T10:00:00Z").unwrap());
//!
//! let position = ledger
//!     .open(
//!         OpenPosition::new("BTCUSDT", Direction::Long, 100.0, 1000.0, 100_000.0)
//!             .with_stop(95.0),
//!     )
//!     .unwrap();
//! println!("Risk: ${:?}", position.risk_usd);
//!
//! let position = ledger.apply(&position, LedgerEvent::MoveToBreakeven).unwrap();
//! assert_eq!(position.risk_usd, Some(0.0));
//! ```

pub mod analytics;
pub mod behavior;
pub mod config;
pub mod ledger;
pub mod records;
pub mod risk;
pub mod time;
pub mod types;

// Re-export commonly used types
pub use types::{
    ActionEntry, ActionKind, ApiResponse, CloseReason, Direction, FillRecord, Position,
    PositionStatus, Ratio,
};

// Re-export main functionality
pub use analytics::{analyze, AnalyticsParams, AnalyticsReport, FilterSpec, Outcome, StatusFilter};
pub use behavior::{
    analyze_behavior, detect_revenge_trades, detect_tilt, BehaviorReport, RevengeReport, TiltReport,
    TiltThresholds,
};
pub use config::JournalConfig;
pub use ledger::{directional_pnl, LedgerEvent, OpenPosition, PositionLedger};
pub use records::{load_positions, PositionRecord, RejectedRecord};
pub use risk::{RiskInputs, RiskReward};
pub use time::{Clock, FixedClock, SystemClock, Timezone};

/// Error types for journal-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid position state: {0}")]
    InvalidPositionState(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Undefined metric: {0}")]
    UndefinedMetric(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for journal-core operations.
pub type Result<T> = std::result::Result<T, Error>;
