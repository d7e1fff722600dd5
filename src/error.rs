//! Error types shared by request validation, resolution and classification.
use thiserror::Error;

/// Failures that stop a scan from starting, or that a caller asked for
/// explicitly (such as an out-of-range offset lookup).
///
/// Per-target network failures never show up here. They are contained in
/// [`ProbeOutcome`](crate::scanner::ProbeOutcome) and never abort a scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The request failed validation. No worker was spawned.
    #[error("invalid scan request: {0}")]
    InvalidRequest(String),

    /// An offset outside `0..size` was resolved against an enumerator.
    #[error("offset {offset} is out of range for {size} targets")]
    OutOfRange { offset: u64, size: u64 },

    /// The host could not be resolved to any address.
    #[error("host {host:?} could not be resolved")]
    Resolve { host: String },

    /// The configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Why an application-protocol status query did not produce a classification.
///
/// The engine downgrades every variant to
/// [`Classification::Unclassified`](crate::classify::Classification::Unclassified).
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("i/o error during status query: {0}")]
    Io(#[from] std::io::Error),

    #[error("status query timed out")]
    Timeout,

    #[error("unexpected status response: {0}")]
    Protocol(String),

    #[error("malformed status document: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio::time::error::Elapsed> for ClassifyError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}
