use std::time::Duration;
use thiserror::Error as ThisError;

/// Failure of a single sensor read. Never fatal for the cycle.
#[derive(ThisError, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("sensor read failed: {0}")]
    ReadFailed(String),

    #[error("sensor read timed out after {0:?}")]
    Timeout(Duration),

    #[error("no sample available yet")]
    NoSample,

    #[error("latest sample is stale ({0:?} old)")]
    Stale(Duration),

    #[error("exporter request failed: {0}")]
    Exporter(String),
}

/// Failure of a single sink publish. Logged by the dispatcher, never fatal.
#[derive(ThisError, Debug)]
pub enum SinkError {
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("InfluxDB rejected write with status {status}: {body}")]
    InfluxRejected { status: u16, body: String },

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] std::fmt::Error),

    #[error("{0}")]
    Other(String),
}

/// Startup-time configuration problems.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid duration '{0}' (expected e.g. 500ms, 5s, 1m)")]
    InvalidDuration(String),

    #[error("unknown sensor source '{0}' (expected 'exporter' or 'simulated')")]
    UnknownSource(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("metrics server error: {0}")]
    MetricsServer(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
