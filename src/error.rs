use thiserror::Error;

/// Errors for measurement messages rejected by sample ingest
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Malformed payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Payload has no weight field")]
    MissingWeight,

    #[error("Weight must be non-negative, got {0}")]
    NegativeWeight(f64),

    #[error("Weight is not a finite number")]
    NonFiniteWeight,

    #[error("Unknown weight unit: {0}")]
    UnknownUnit(String),
}

/// Errors that can occur when emitting a metric data point
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to emit metric: {0}")]
    EmitFailed(String),

    #[error("Metric emit timed out")]
    Timeout,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to encode metric: {0}")]
    EncodeError(#[from] serde_json::Error),
}

/// Errors that can occur when sending alerts
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to send notification: {0}")]
    NotificationFailed(String),

    #[error("Notification delivery timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Errors from reading or writing the persisted alarm state
#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt state file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
