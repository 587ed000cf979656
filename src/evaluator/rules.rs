//! Threshold rules for the windowed evaluator
//!
//! Defines the comparison operators, the missing-data policies and the
//! validated evaluator configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest supported period, one day
const MAX_PERIOD_SECONDS: u64 = 86_400;
const MAX_EVALUATION_PERIODS: usize = 1_440;

/// How a period's representative value is compared against the threshold
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonOperator {
    #[serde(alias = "LessThanThreshold")]
    LessThan,
    #[serde(alias = "GreaterThanThreshold")]
    GreaterThan,
    #[serde(alias = "LessThanOrEqualToThreshold")]
    LessOrEqual,
    #[serde(alias = "GreaterThanOrEqualToThreshold")]
    GreaterOrEqual,
}

impl ComparisonOperator {
    /// Whether `value` breaches `threshold` under this operator
    pub fn is_breaching(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::LessThan => value < threshold,
            ComparisonOperator::GreaterThan => value > threshold,
            ComparisonOperator::LessOrEqual => value <= threshold,
            ComparisonOperator::GreaterOrEqual => value >= threshold,
        }
    }

    /// Phrase used in evaluation reasons, e.g. "less than"
    pub fn phrase(self) -> &'static str {
        match self {
            ComparisonOperator::LessThan => "less than",
            ComparisonOperator::GreaterThan => "greater than",
            ComparisonOperator::LessOrEqual => "less than or equal to",
            ComparisonOperator::GreaterOrEqual => "greater than or equal to",
        }
    }
}

/// How a period without any samples is treated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissingDataPolicy {
    /// Excluded from both breach count and total
    Ignore,
    /// Counted as a non-breaching period
    NotBreaching,
    /// Counted as a breaching period
    Breaching,
    /// Counted as a period without data
    Missing,
}

/// Configuration of the windowed evaluator
///
/// Every field is caller-supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorConfig {
    pub threshold: f64,
    pub comparison: ComparisonOperator,
    pub period_length: Duration,
    pub evaluation_periods: usize,
    pub datapoints_to_alarm: usize,
    pub missing_data: MissingDataPolicy,
}

impl EvaluatorConfig {
    /// Check the configuration for internal consistency
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() {
            return Err(ConfigError::ValidationError(
                "threshold must be a finite number".to_string(),
            ));
        }

        let seconds = self.period_length.as_secs();
        if seconds == 0 || seconds > MAX_PERIOD_SECONDS || self.period_length.subsec_nanos() != 0 {
            return Err(ConfigError::ValidationError(format!(
                "period length must be a whole number of seconds between 1 and {}",
                MAX_PERIOD_SECONDS
            )));
        }

        if self.evaluation_periods == 0 || self.evaluation_periods > MAX_EVALUATION_PERIODS {
            return Err(ConfigError::ValidationError(format!(
                "evaluation_periods must be between 1 and {}",
                MAX_EVALUATION_PERIODS
            )));
        }

        if self.datapoints_to_alarm == 0 || self.datapoints_to_alarm > self.evaluation_periods {
            return Err(ConfigError::ValidationError(format!(
                "datapoints_to_alarm must be between 1 and evaluation_periods ({}), got {}",
                self.evaluation_periods, self.datapoints_to_alarm
            )));
        }

        Ok(())
    }

    /// Period length as a chrono duration, for timestamp arithmetic
    pub fn period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.period_length.as_secs() as i64)
    }

    /// Total time span covered by the retained periods
    pub fn window_span(&self) -> chrono::Duration {
        self.period() * self.evaluation_periods as i32
    }
}
