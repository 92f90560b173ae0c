//! Journal configuration.
//!
//! Loaded from TOML at `$JOURNAL_CONFIG_FILE` or `~/.journal/config.toml`,
//! falling back to defaults when the file does not exist. A few environment
//! variables override file values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analytics::{AnalyticsParams, DEFAULT_BE_THRESHOLD};
use crate::behavior::{TiltThresholds, DEFAULT_REVENGE_WINDOW_MINUTES};
use crate::ledger::DEFAULT_CLOSE_EPSILON;
use crate::time::Timezone;
use crate::{Error, Result};

const CONFIG_FILE_ENV: &str = "JOURNAL_CONFIG_FILE";
const TIMEZONE_ENV: &str = "JOURNAL_TIMEZONE";
const BE_THRESHOLD_ENV: &str = "JOURNAL_BE_THRESHOLD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// IANA name or fixed offset; UTC when absent
    pub timezone: Timezone,
    pub starting_balance: f64,
    pub be_threshold: f64,
    pub revenge_window_minutes: i64,
    pub tilt: TiltThresholds,
    /// Remaining size at or below which a partial close flattens the position
    pub close_epsilon: f64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            timezone: Timezone::utc(),
            starting_balance: 10_000.0,
            be_threshold: DEFAULT_BE_THRESHOLD,
            revenge_window_minutes: DEFAULT_REVENGE_WINDOW_MINUTES,
            tilt: TiltThresholds::default(),
            close_epsilon: DEFAULT_CLOSE_EPSILON,
        }
    }
}

impl JournalConfig {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_FILE_ENV) {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".journal/config.toml"))
            .unwrap_or_else(|| PathBuf::from("journal.toml"))
    }

    /// Load from the default path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&Self::default_path())?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific path; defaults when the file is missing.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply `JOURNAL_TIMEZONE` and `JOURNAL_BE_THRESHOLD` through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tz) = lookup(TIMEZONE_ENV) {
            self.timezone = Timezone::parse_or_utc(Some(tz.as_str()))?;
        }
        if let Some(raw) = lookup(BE_THRESHOLD_ENV) {
            self.be_threshold = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{} is not a number: {}", BE_THRESHOLD_ENV, raw))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.starting_balance.is_finite() || self.starting_balance <= 0.0 {
            return Err(Error::Config(format!(
                "starting_balance must be positive, got {}",
                self.starting_balance
            )));
        }
        if !self.be_threshold.is_finite() || self.be_threshold < 0.0 {
            return Err(Error::Config(format!(
                "be_threshold must be non-negative, got {}",
                self.be_threshold
            )));
        }
        if self.revenge_window_minutes < 0 {
            return Err(Error::Config(format!(
                "revenge_window_minutes must be non-negative, got {}",
                self.revenge_window_minutes
            )));
        }
        if !self.close_epsilon.is_finite() || self.close_epsilon < 0.0 {
            return Err(Error::Config(format!(
                "close_epsilon must be non-negative, got {}",
                self.close_epsilon
            )));
        }
        Ok(())
    }

    pub fn analytics_params(&self) -> AnalyticsParams {
        AnalyticsParams::new(self.starting_balance)
            .with_timezone(self.timezone)
            .with_be_threshold(self.be_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = JournalConfig::load_from_path(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, JournalConfig::default());
        assert_eq!(config.be_threshold, 0.5);
        assert_eq!(config.revenge_window_minutes, 30);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
timezone = "America/New_York"
starting_balance = 25000.0

[tilt]
daily_opens = 3
"#,
        )
        .unwrap();

        let config = JournalConfig::load_from_path(&path).unwrap();

        assert_eq!(config.timezone, "America/New_York".parse().unwrap());
        assert_eq!(config.starting_balance, 25_000.0);
        assert_eq!(config.be_threshold, 0.5);
        assert_eq!(config.tilt.daily_opens, 3);
        assert_eq!(config.tilt.daily_opens_high, 8);
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = JournalConfig::default();
        config.timezone = "UTC+05:30".parse().unwrap();
        config.revenge_window_minutes = 45;

        config.save_to_path(&path).unwrap();
        let loaded = JournalConfig::load_from_path(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "starting_balance = -5.0\n").unwrap();
        assert!(matches!(JournalConfig::load_from_path(&path), Err(Error::Config(_))));

        fs::write(&path, "timezone = \"Mars/Olympus\"\n").unwrap();
        assert!(matches!(JournalConfig::load_from_path(&path), Err(Error::Toml(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = JournalConfig::default();
        config
            .apply_overrides(|key| match key {
                "JOURNAL_TIMEZONE" => Some("Europe/Berlin".to_string()),
                "JOURNAL_BE_THRESHOLD" => Some(" 1.25 ".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.timezone, "Europe/Berlin".parse().unwrap());
        assert_eq!(config.be_threshold, 1.25);

        let err = config
            .apply_overrides(|key| (key == "JOURNAL_BE_THRESHOLD").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_analytics_params() {
        let mut config = JournalConfig::default();
        config.be_threshold = 2.0;
        let params = config.analytics_params();
        assert_eq!(params.be_threshold, 2.0);
        assert_eq!(params.starting_balance, 10_000.0);
    }
}
