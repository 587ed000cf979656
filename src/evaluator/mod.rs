/// Threshold rules and evaluator configuration
pub mod rules;
pub mod windowed_evaluator;

pub use rules::{ComparisonOperator, EvaluatorConfig, MissingDataPolicy};
pub use windowed_evaluator::{PeriodOutcome, WindowedEvaluator};
