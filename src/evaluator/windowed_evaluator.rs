//! Windowed threshold evaluation
//!
//! Each evaluation tick closes one period. The period's samples are reduced to
//! their average, compared against the threshold, and the outcome is pushed
//! into a fixed-size buffer of the last `evaluation_periods` outcomes. The
//! buffer is then summarized into an [`EvaluationResult`].

use crate::error::ConfigError;
use crate::evaluator::rules::{EvaluatorConfig, MissingDataPolicy};
use crate::events::EvaluationResult;
use log::debug;
use std::collections::VecDeque;

/// Resolved outcome of one closed period
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeriodOutcome {
    /// The period breached the threshold; `None` when resolved from missing data
    Breaching(Option<f64>),
    /// The period did not breach; `None` when resolved from missing data
    NotBreaching(Option<f64>),
    /// The period had no samples and the policy is `MISSING`
    Missing,
}

impl PeriodOutcome {
    fn is_breaching(&self) -> bool {
        matches!(self, PeriodOutcome::Breaching(_))
    }

    fn is_resolvable(&self) -> bool {
        !matches!(self, PeriodOutcome::Missing)
    }

    fn value(&self) -> Option<f64> {
        match self {
            PeriodOutcome::Breaching(value) | PeriodOutcome::NotBreaching(value) => *value,
            PeriodOutcome::Missing => None,
        }
    }
}

/// Evaluates closed periods against the configured threshold rule
#[derive(Debug)]
pub struct WindowedEvaluator {
    config: EvaluatorConfig,
    /// Outcomes of the most recent periods, oldest first
    outcomes: VecDeque<PeriodOutcome>,
}

impl WindowedEvaluator {
    /// Create an evaluator for a validated configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the configuration is invalid,
    /// e.g. `datapoints_to_alarm > evaluation_periods`.
    pub fn new(config: EvaluatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = config.evaluation_periods;
        Ok(Self {
            config,
            outcomes: VecDeque::with_capacity(capacity),
        })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Retained period outcomes, oldest first
    pub fn outcomes(&self) -> impl Iterator<Item = &PeriodOutcome> {
        self.outcomes.iter()
    }

    /// Close one period with the given sample values and summarize the window
    ///
    /// An empty period under the `IGNORE` policy leaves the buffer untouched,
    /// so the verdict is reached from the most recent periods that had data.
    pub fn evaluate_period(&mut self, values: &[f64]) -> EvaluationResult {
        match self.resolve_period(values) {
            Some(outcome) => {
                debug!("Period resolved as {:?}", outcome);
                self.outcomes.push_back(outcome);
                while self.outcomes.len() > self.config.evaluation_periods {
                    self.outcomes.pop_front();
                }
            }
            None => debug!("Empty period ignored"),
        }

        self.summarize()
    }

    /// Resolve a period to an outcome; `None` means the period is ignored
    fn resolve_period(&self, values: &[f64]) -> Option<PeriodOutcome> {
        if values.is_empty() {
            return match self.config.missing_data {
                MissingDataPolicy::Ignore => None,
                MissingDataPolicy::NotBreaching => Some(PeriodOutcome::NotBreaching(None)),
                MissingDataPolicy::Breaching => Some(PeriodOutcome::Breaching(None)),
                MissingDataPolicy::Missing => Some(PeriodOutcome::Missing),
            };
        }

        let average = values.iter().sum::<f64>() / values.len() as f64;
        if self
            .config
            .comparison
            .is_breaching(average, self.config.threshold)
        {
            Some(PeriodOutcome::Breaching(Some(average)))
        } else {
            Some(PeriodOutcome::NotBreaching(Some(average)))
        }
    }

    /// Summarize the retained outcomes
    fn summarize(&self) -> EvaluationResult {
        let periods_total = self.outcomes.iter().filter(|o| o.is_resolvable()).count();
        let periods_breached = self.outcomes.iter().filter(|o| o.is_breaching()).count();
        let required = self.config.datapoints_to_alarm;
        let has_sufficient_data = periods_total >= required;
        let breaching = has_sufficient_data && periods_breached >= required;

        let reason = if has_sufficient_data {
            format!(
                "Threshold {}: {} out of the last {} datapoints {} {} the threshold ({}), {} required for ALARM",
                if breaching { "Crossed" } else { "Not Crossed" },
                periods_breached,
                periods_total,
                self.format_values(),
                if periods_breached == 1 { "was" } else { "were" },
                self.describe_comparison(),
                required
            )
        } else {
            format!(
                "Insufficient Data: {} of the last {} periods had data, {} required",
                periods_total,
                self.outcomes.len(),
                required
            )
        };

        EvaluationResult {
            periods_breached,
            periods_total,
            has_sufficient_data,
            breaching,
            reason,
        }
    }

    fn describe_comparison(&self) -> String {
        format!(
            "{} {}",
            self.config.comparison.phrase(),
            self.config.threshold
        )
    }

    fn format_values(&self) -> String {
        let values: Vec<String> = self
            .outcomes
            .iter()
            .map(|outcome| match outcome.value() {
                Some(value) => format!("{:.1}", value),
                None => "-".to_string(),
            })
            .collect();
        format!("[{}]", values.join(", "))
    }
}


// Property-based tests
#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::evaluator::rules::ComparisonOperator;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;
    use std::time::Duration;

    /// Arbitrary evaluator configuration with consistent period counts
    #[derive(Debug, Clone)]
    struct ArbitraryConfig(EvaluatorConfig);

    impl Arbitrary for ArbitraryConfig {
        fn arbitrary(g: &mut Gen) -> Self {
            let evaluation_periods = usize::arbitrary(g) % 6 + 1;
            let datapoints_to_alarm = usize::arbitrary(g) % evaluation_periods + 1;
            let comparisons = [
                ComparisonOperator::LessThan,
                ComparisonOperator::GreaterThan,
                ComparisonOperator::LessOrEqual,
                ComparisonOperator::GreaterOrEqual,
            ];
            let policies = [
                MissingDataPolicy::Ignore,
                MissingDataPolicy::NotBreaching,
                MissingDataPolicy::Breaching,
                MissingDataPolicy::Missing,
            ];

            ArbitraryConfig(EvaluatorConfig {
                threshold: 10_000.0,
                comparison: *g.choose(&comparisons).unwrap(),
                period_length: Duration::from_secs(300),
                evaluation_periods,
                datapoints_to_alarm,
                missing_data: *g.choose(&policies).unwrap(),
            })
        }
    }

    /// A sequence of periods, each empty or holding a few weights in grams
    #[derive(Debug, Clone)]
    struct Periods(Vec<Vec<f64>>);

    impl Arbitrary for Periods {
        fn arbitrary(g: &mut Gen) -> Self {
            let count = usize::arbitrary(g) % 20 + 1;
            let periods = (0..count)
                .map(|_| {
                    let samples = usize::arbitrary(g) % 4;
                    (0..samples)
                        .map(|_| (u16::arbitrary(g) % 20_000) as f64)
                        .collect()
                })
                .collect();
            Periods(periods)
        }
    }

    // The result is always internally consistent: breaching implies enough
    // data, counts never exceed the buffer, and the buffer never overflows.
    #[quickcheck]
    fn prop_result_is_consistent(config: ArbitraryConfig, periods: Periods) -> bool {
        let config = config.0;
        let mut evaluator = WindowedEvaluator::new(config.clone()).unwrap();

        periods.0.iter().all(|values| {
            let result = evaluator.evaluate_period(values);
            let retained = evaluator.outcomes().count();

            retained <= config.evaluation_periods
                && result.periods_breached <= result.periods_total
                && result.periods_total <= retained
                && (!result.breaching || result.has_sufficient_data)
                && result.breaching == (result.has_sufficient_data
                    && result.periods_breached >= config.datapoints_to_alarm)
        })
    }
}
