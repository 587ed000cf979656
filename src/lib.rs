/// Error types for every pipeline stage
pub mod error;

/// Core data types shared across the pipeline
pub mod events;

/// Sample window with time-based expiration
pub mod aggregator;

/// Measurement message parsing and TCP transport
pub mod ingest;

/// Metric data point sinks
pub mod metrics;

/// Windowed threshold evaluation
pub mod evaluator;

/// Alarm state machine and notification delivery
pub mod alerts;

/// Configuration management
pub mod config;

/// Tick loop tying the pipeline together
pub mod watcher;

// Re-export commonly used types
pub use error::{AlertError, ConfigError, IngestError, SinkError, StateStoreError};
pub use events::{AlarmState, EvaluationResult, Sample, TransitionEvent};
pub use watcher::{TickReport, Watcher};
