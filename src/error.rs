//! Error types.
//!
//! Two families live here. [`Failure`] classifies a single funnel step and is
//! always carried as data; flows decide what a failure means. [`Error`] covers
//! everything that can stop a run before it starts: bad configuration, a
//! client that cannot be built, an unreadable profile.

use thiserror::Error;

/// Why a funnel step did not succeed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Failure {
    /// Connection-level problem, no HTTP response was obtained.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response status is not among the accepted ones for the step.
    #[error("expected status in {expected:?}, got {actual}")]
    StatusMismatch { expected: Vec<u16>, actual: u16 },

    /// The body had to be JSON and was not.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A template referenced a value no earlier step produced.
    #[error("missing extracted value '{0}'")]
    MissingExtractedValue(String),
}

/// Setup and run errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid flow, scheduler or profile configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse profile: {0}")]
    Profile(#[from] serde_json::Error),

    /// Every session receiver was dropped before shutdown could be signalled.
    #[error("Failed to signal shutdown to sessions")]
    Shutdown,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for shopload operations.
pub type Result<T> = std::result::Result<T, Error>;
