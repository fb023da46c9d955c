//! Error taxonomy for recording and reconstruction
//!
//! Orphan returns and ROOT attribution are expected outcomes of the
//! attribution algorithm and never surface here.

use thiserror::Error;

/// Errors raised by recorders, codecs and the batch reconstructor
#[derive(Error, Debug)]
pub enum TraceError {
    /// Write, mark or flatten attempted after the sink was closed
    #[error("closed stream")]
    IoClosed,

    /// A raw log or output row is missing a required field or has an unparsable value
    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TraceError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TraceError>;
