//! Corporate split events.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stock split: `split_from` old shares became `split_to` new shares on
/// `execution_date`. A 2-for-1 split is `split_from = 1`, `split_to = 2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitEvent {
    pub ticker: String,
    pub execution_date: NaiveDate,
    pub split_from: f64,
    pub split_to: f64,
}

/// Invalid split configuration. Fatal to the affected ticker only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    #[error("invalid split ratio for {ticker} on {execution_date}: {split_to}-for-{split_from}")]
    InvalidRatio {
        ticker: String,
        execution_date: NaiveDate,
        split_from: f64,
        split_to: f64,
    },

    #[error("conflicting splits for {ticker} on {execution_date}: factors {first} and {second}")]
    Conflicting {
        ticker: String,
        execution_date: NaiveDate,
        first: f64,
        second: f64,
    },
}

impl SplitEvent {
    pub fn new(
        ticker: impl Into<String>,
        execution_date: NaiveDate,
        split_from: f64,
        split_to: f64,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            execution_date,
            split_from,
            split_to,
        }
    }

    /// Price divisor (and volume multiplier) for bars before the execution date.
    pub fn factor(&self) -> Result<f64, SplitError> {
        let factor = self.split_to / self.split_from;
        if self.split_from > 0.0 && self.split_to > 0.0 && factor.is_finite() && factor > 0.0 {
            Ok(factor)
        } else {
            Err(SplitError::InvalidRatio {
                ticker: self.ticker.clone(),
                execution_date: self.execution_date,
                split_from: self.split_from,
                split_to: self.split_to,
            })
        }
    }
}
