//! Persistence-boundary records.
//!
//! Stored trade records use string timestamps and a few legacy field names.
//! They are migrated to the canonical [`Position`] here so the analytics core
//! only ever sees one schema. A record that cannot be migrated is rejected on
//! its own; it never fails the whole batch.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ledger::{directional_pnl, risk_basis};
use crate::risk::{percent_of, RiskInputs, RiskReward};
use crate::time::{minutes_between, parse_timestamp};
use crate::types::{ActionEntry, Direction, FillRecord, Position, PositionStatus};
use crate::{Error, Result};

/// A trade record as stored by the persistence layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, alias = "coin")]
    pub symbol: Option<String>,
    /// `long`/`short`, or legacy `buy`/`sell`
    #[serde(default, alias = "side")]
    pub direction: Option<String>,
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,

    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default, alias = "position_size")]
    pub position_size_usd: Option<f64>,
    #[serde(default)]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub take_price: Option<f64>,
    #[serde(default)]
    pub original_entry_price: Option<f64>,
    #[serde(default)]
    pub original_stop_price: Option<f64>,
    #[serde(default)]
    pub original_size_usd: Option<f64>,

    #[serde(default)]
    pub risk_usd: Option<f64>,
    #[serde(default)]
    pub max_risk_usd: Option<f64>,
    #[serde(default)]
    pub realized_pnl_usd: Option<f64>,
    #[serde(default, alias = "account_balance")]
    pub account_balance_at_entry: Option<f64>,

    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "open_date")]
    pub date_open: Option<String>,
    #[serde(default, alias = "close_date")]
    pub date_close: Option<String>,
    #[serde(default)]
    pub close_price: Option<f64>,

    #[serde(default)]
    pub pnl_usd: Option<f64>,
    /// Legacy total PnL field, preferred over `pnl_usd` when present
    #[serde(default)]
    pub pnl_total_usd: Option<f64>,
    #[serde(default)]
    pub pnl: Option<f64>,
    #[serde(default)]
    pub r_multiple: Option<f64>,

    #[serde(default)]
    pub adds: Vec<FillRecord>,
    #[serde(default)]
    pub partial_closes: Vec<FillRecord>,
    #[serde(default)]
    pub action_history: Vec<ActionEntry>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A record excluded from the migrated set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectedRecord {
    /// Position of the record in the input batch
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub reason: String,
}

fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_direction(raw: Option<&str>) -> Result<Direction> {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("long") | Some("buy") => Ok(Direction::Long),
        Some("short") | Some("sell") => Ok(Direction::Short),
        other => Err(Error::InvalidPositionState(format!(
            "unknown direction {:?}",
            other
        ))),
    }
}

fn required(name: &str, value: Option<f64>) -> Result<f64> {
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::InvalidPositionState(format!("missing {}", name)))
}

impl PositionRecord {
    pub fn id(&self) -> Option<String> {
        self.id.as_ref().and_then(id_string)
    }

    /// Migrate to the canonical position shape.
    pub fn into_position(self) -> Result<Position> {
        let id = self
            .id()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let direction = parse_direction(self.direction.as_deref())?;
        let entry_price = required("entry_price", self.entry_price)?;
        let size_usd = required("position_size_usd", self.position_size_usd)?;
        let balance = required("account_balance_at_entry", self.account_balance_at_entry)?;

        let date_open = parse_timestamp(self.date_open.as_deref().unwrap_or_default())?;
        let date_close = match self.date_close.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => Some(parse_timestamp(s)?),
            _ => None,
        };

        let closed = match self.status.as_deref().map(|s| s.trim().to_lowercase()) {
            Some(s) if s == "closed" => true,
            Some(s) if s == "open" => false,
            _ => self.close_price.is_some(),
        };

        let realized = self.realized_pnl_usd.unwrap_or(0.0);
        let rr = RiskReward::calculate(&RiskInputs {
            entry: entry_price,
            size_usd,
            stop: self.stop_price,
            take: self.take_price,
            balance,
            basis_risk_usd: self.max_risk_usd.unwrap_or(0.0),
        })?;
        let risk_usd = if closed {
            self.risk_usd.or(rr.risk_usd)
        } else {
            rr.risk_usd
        };
        let max_risk_usd = self
            .max_risk_usd
            .unwrap_or(0.0)
            .max(risk_usd.unwrap_or(0.0));

        let mut position = Position {
            id,
            symbol: self.symbol.unwrap_or_default().to_uppercase(),
            direction,
            strategy: self.strategy,
            timeframe: self.timeframe,
            entry_price,
            position_size_usd: size_usd,
            stop_price: self.stop_price,
            take_price: self.take_price,
            original_entry_price: self.original_entry_price.unwrap_or(entry_price),
            original_stop_price: self.original_stop_price.or(self.stop_price),
            original_size_usd: self.original_size_usd.unwrap_or(size_usd),
            risk_usd,
            risk_percent: risk_usd.map(|r| percent_of(r, balance)),
            max_risk_usd,
            reward_usd: rr.reward_usd,
            reward_percent: rr.reward_percent,
            rr_ratio: rr.rr_ratio,
            realized_pnl_usd: realized,
            account_balance_at_entry: balance,
            status: PositionStatus::Open,
            date_open,
            date_close: None,
            close_price: None,
            close_reason: None,
            pnl_usd: None,
            pnl_percent: None,
            r_multiple: None,
            r_multiple_degenerate: false,
            duration_minutes: None,
            adds: self.adds,
            partial_closes: self.partial_closes,
            action_history: self.action_history,
            notes: self.notes,
            tags: self.tags,
        };

        if closed {
            let pnl = self
                .pnl_total_usd
                .or(self.pnl_usd)
                .or(self.pnl)
                .or_else(|| {
                    self.close_price.map(|price| {
                        realized + directional_pnl(entry_price, price, size_usd, direction)
                    })
                })
                .ok_or_else(|| {
                    Error::InvalidPositionState("closed record has no pnl or close price".into())
                })?;
            let basis = risk_basis(&position);

            position.status = PositionStatus::Closed;
            position.close_price = self.close_price;
            position.date_close = date_close;
            position.pnl_usd = Some(pnl);
            position.pnl_percent = Some(percent_of(pnl, balance));
            position.r_multiple = Some(self.r_multiple.unwrap_or(pnl / basis.value));
            position.r_multiple_degenerate = self.r_multiple.is_none() && basis.is_degenerate();
            position.duration_minutes = date_close.map(|close| minutes_between(&close, &date_open));
        }

        Ok(position)
    }
}

/// Migrate a batch of records, isolating failures.
pub fn load_positions(records: Vec<PositionRecord>) -> (Vec<Position>, Vec<RejectedRecord>) {
    let mut positions = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        let id = record.id();
        match record.into_position() {
            Ok(position) => positions.push(position),
            Err(e) => {
                tracing::warn!("Excluding record {} ({:?}): {}", index, id, e);
                rejected.push(RejectedRecord {
                    index,
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }

    (positions, rejected)
}

/// Migrate raw JSON values, rejecting those that don't deserialize.
pub fn load_positions_from_values(values: Vec<Value>) -> (Vec<Position>, Vec<RejectedRecord>) {
    let mut positions = Vec::with_capacity(values.len());
    let mut rejected = Vec::new();

    for (index, value) in values.into_iter().enumerate() {
        let id = value.get("id").and_then(id_string);
        let migrated = serde_json::from_value::<PositionRecord>(value)
            .map_err(Error::from)
            .and_then(PositionRecord::into_position);
        match migrated {
            Ok(position) => positions.push(position),
            Err(e) => {
                tracing::warn!("Excluding record {} ({:?}): {}", index, id, e);
                rejected.push(RejectedRecord {
                    index,
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }

    (positions, rejected)
}

/// Read a JSON array of records from disk.
///
/// Accepts either a bare array or an object with a `positions` array.
pub fn load_positions_from_path(path: &Path) -> Result<(Vec<Position>, Vec<RejectedRecord>)> {
    let content = fs::read_to_string(path)?;
    let data: Value = serde_json::from_str(&content)?;

    let values = match data {
        Value::Array(values) => values,
        Value::Object(mut map) => match map.remove("positions") {
            Some(Value::Array(values)) => values,
            _ => {
                return Err(Error::InvalidPositionState(
                    "expected an array of positions".to_string(),
                ))
            }
        },
        _ => {
            return Err(Error::InvalidPositionState(
                "expected an array of positions".to_string(),
            ))
        }
    };

    Ok(load_positions_from_values(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(value: Value) -> PositionRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_migrates_legacy_fields() {
        let position = record(json!({
            "id": 42,
            "coin": "btcusdt",
            "side": "sell",
            "entry_price": 200.0,
            "position_size": 2000.0,
            "stop_price": 210.0,
            "account_balance": 50000.0,
            "open_date": "2024-01-01 10:00:00",
            "close_date": "2024-01-01T11:00:00Z",
            "close_price": 190.0,
            "pnl_total_usd": 99.0,
            "pnl_usd": 1.0
        }))
        .into_position()
        .unwrap();

        assert_eq!(position.id, "42");
        assert_eq!(position.symbol, "BTCUSDT");
        assert_eq!(position.direction, Direction::Short);
        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.pnl_usd, Some(99.0));
        assert_eq!(position.duration_minutes, Some(60));
        assert_relative_eq!(position.max_risk_usd, 100.0, epsilon = 1e-9);
        assert_relative_eq!(position.r_multiple.unwrap(), 0.99, epsilon = 1e-9);
    }

    #[test]
    fn test_closed_pnl_computed_from_close_price() {
        let position = record(json!({
            "id": "a",
            "direction": "long",
            "entry_price": 100.0,
            "position_size_usd": 1000.0,
            "stop_price": 95.0,
            "account_balance_at_entry": 100000.0,
            "date_open": "2024-01-01T10:00:00Z",
            "date_close": "2024-01-01T12:00:00Z",
            "close_price": 110.0
        }))
        .into_position()
        .unwrap();

        assert_relative_eq!(position.pnl_usd.unwrap(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(position.r_multiple.unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_open_record() {
        let position = record(json!({
            "id": "b",
            "direction": "LONG",
            "entry_price": 100.0,
            "position_size_usd": 1000.0,
            "account_balance_at_entry": 100000.0,
            "date_open": "2024-01-01T10:00:00Z",
            "date_close": ""
        }))
        .into_position()
        .unwrap();

        assert!(position.is_open());
        assert!(position.date_close.is_none());
        assert!(position.risk_usd.is_none());
        assert!(position.pnl_usd.is_none());
    }

    #[test]
    fn test_invalid_timestamp_rejected() {
        let result = record(json!({
            "direction": "long",
            "entry_price": 100.0,
            "position_size_usd": 1000.0,
            "account_balance_at_entry": 100000.0,
            "date_open": "yesterday"
        }))
        .into_position();

        assert!(matches!(result, Err(Error::InvalidTimestamp(_))));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let values = vec![
            json!({
                "id": "good",
                "direction": "long",
                "entry_price": 100.0,
                "position_size_usd": 1000.0,
                "account_balance_at_entry": 100000.0,
                "date_open": "2024-01-01T10:00:00Z"
            }),
            json!({
                "id": "bad-date",
                "direction": "long",
                "entry_price": 100.0,
                "position_size_usd": 1000.0,
                "account_balance_at_entry": 100000.0,
                "date_open": "not-a-date"
            }),
            json!({ "id": "bad-shape", "entry_price": "abc" }),
        ];

        let (positions, rejected) = load_positions_from_values(values);

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].id, "good");
        assert_eq!(rejected.len(), 2);
        assert_eq!(rejected[0].index, 1);
        assert_eq!(rejected[0].id, Some("bad-date".to_string()));
        assert_eq!(rejected[1].id, Some("bad-shape".to_string()));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.json");
        fs::write(
            &path,
            json!({
                "positions": [{
                    "id": "x",
                    "direction": "short",
                    "entry_price": 50.0,
                    "position_size_usd": 500.0,
                    "account_balance_at_entry": 10000.0,
                    "date_open": "2024-02-01"
                }]
            })
            .to_string(),
        )
        .unwrap();

        let (positions, rejected) = load_positions_from_path(&path).unwrap();
        assert_eq!(positions.len(), 1);
        assert!(rejected.is_empty());
        assert_eq!(positions[0].direction, Direction::Short);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let dir = tempdir().unwrap();
        let result = load_positions_from_path(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
