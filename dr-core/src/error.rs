//! Error taxonomy for the DR orchestration engine.
//!
//! Mirrors the error kinds enumerated in the error-handling design:
//! transport failures are classified narrowly (SSL vs. network vs.
//! decode) because the validator and CLI give different hints for each;
//! everything else collapses into a handful of fatal-for-the-run
//! variants plus an `ExecutionFailed` carrying the non-empty `failed`
//! bucket so callers can report counts without re-deriving them.

use thiserror::Error;

/// Transport-level failure classification (see Component Design, Transport).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("SSL certificate verification failed (use -k/--insecure to skip)")]
    SslUntrusted,
    #[error("SSL connection closed unexpectedly (EOF)")]
    SslEof,
    #[error("failed to decode response body as JSON")]
    Decode,
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum DrError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("module '{module}' has a dependency cycle; refusing to plan")]
    PlannerCycle { module: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("procedure completed with {failed} failed service(s)")]
    ExecutionFailed { failed: usize },

    #[error("unknown command: {0}")]
    InvalidCommand(String),
}

pub type Result<T> = std::result::Result<T, DrError>;
