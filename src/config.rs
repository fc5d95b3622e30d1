use crate::error::{Error, Result};
use crate::storage::repository;
use crate::storage::Database;

/// Hourly rate applied to an assignee the first time they are seen.
pub const DEFAULT_HOURLY_COST: f64 = 50.0;

/// `app_config` key overriding [`DEFAULT_HOURLY_COST`].
pub const DEFAULT_HOURLY_COST_KEY: &str = "default_hourly_cost";

/// Settings consumed by the cost calculator and the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub default_hourly_cost: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_hourly_cost: DEFAULT_HOURLY_COST,
        }
    }
}

impl EngineConfig {
    /// Load engine settings from the database's `app_config` table.
    pub async fn load(db: &Database) -> Result<Self> {
        let raw: Option<String> = db
            .reader()
            .call(|conn| repository::get_config(conn, DEFAULT_HOURLY_COST_KEY))
            .await?;

        match raw {
            Some(value) => Ok(Self {
                default_hourly_cost: parse_rate(&value)?,
            }),
            None => Ok(Self::default()),
        }
    }
}

/// Parse and validate an hourly rate. Rates must be finite and non-negative.
pub fn parse_rate(value: &str) -> Result<f64> {
    let rate: f64 = value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("not a number: {value}")))?;
    validate_rate(rate)?;
    Ok(rate)
}

pub fn validate_rate(rate: f64) -> Result<()> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(Error::InvalidInput(format!(
            "hourly cost must be a finite, non-negative number (got {rate})"
        )));
    }
    Ok(())
}
