//! Error types for coterie-llm

use thiserror::Error;

/// Transport error type
#[derive(Debug, Error)]
pub enum Error {
    /// Backend not configured (missing credential or executable)
    #[error("backend not configured: {0}")]
    NotConfigured(String),

    /// API error
    #[error("api error: {0}")]
    Api(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit,

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Streaming error (stream broke before the stop signal)
    #[error("stream error: {0}")]
    Stream(String),

    /// CLI process could not be launched
    #[error("failed to launch cli: {0}")]
    CliLaunch(String),

    /// CLI process exited with a failure status and produced no usable output
    #[error("cli exited with status {code}: {stderr}")]
    CliExit {
        /// Process exit code (-1 if killed by signal)
        code: i32,
        /// Captured stderr, truncated
        stderr: String,
    },

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
