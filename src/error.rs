//! Error types for rswidevine-keys.

use thiserror::Error;

use crate::acquisition::AcquisitionStep;

/// Main error type for key acquisition.
#[derive(Debug, Error)]
pub enum Error {
    /// The license server answered with a non-success status.
    ///
    /// `body` is the raw response text, kept verbatim for diagnostics.
    #[error("Failed to {step}: [{status}] {body}")]
    Transport {
        step: AcquisitionStep,
        status: u16,
        body: String,
    },

    /// The decryption API answered with a non-success status.
    #[error("Failed to {step}: {message}")]
    Api {
        step: AcquisitionStep,
        code: i64,
        message: String,
    },

    /// The decryption API answered 2xx with a body that is not the expected shape.
    #[error("Malformed response while trying to {step}: {reason}")]
    MalformedResponse {
        step: AcquisitionStep,
        reason: String,
    },

    /// The request context is unusable (bad URL, empty PSSH, ...).
    #[error("Invalid request context: {0}")]
    InvalidContext(String),

    /// The PSSH / init data could not be parsed.
    #[error("Invalid init data: {0}")]
    InvalidInitData(String),

    /// A caller supplied header name or value is invalid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Client configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to decode data.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Connection level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Base64 decode error.
    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The acquisition step that failed, if the error came from one.
    pub fn step(&self) -> Option<AcquisitionStep> {
        match self {
            Error::Transport { step, .. }
            | Error::Api { step, .. }
            | Error::MalformedResponse { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Result type alias for rswidevine-keys operations.
pub type Result<T> = std::result::Result<T, Error>;
