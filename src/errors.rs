//! Core error types for the GreatFeel client.
//!
//! Transport-level errors (`ApiError`) are classified by the HTTP layer
//! and propagate up to the session manager, which either retries once
//! (only for `Unauthorized`, via refresh) or maps them into the
//! session-level taxonomy (`AuthError`) surfaced to callers.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the client core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("API request failed: {0}")]
    Api(#[from] ApiError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Secret store error: {0}")]
    Secret(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Transport-level errors, classified from HTTP status and connection
/// failures. `Timeout` is distinct from other network errors so callers
/// can tell a slow server from an unreachable one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unauthorized. Please log in again")]
    Unauthorized,

    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    #[error("Server error {status}")]
    Server { status: u16 },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ApiError {
    /// Create a client error from status and server message.
    pub fn client(status: u16, message: impl Into<String>) -> Self {
        Self::Client {
            status,
            message: message.into(),
        }
    }
}

/// Session-level errors surfaced by login/register/refresh flows.
///
/// Derived from a transport error plus status-code heuristics, or raised
/// directly by local validation. `Clone` because the refresh outcome is
/// shared between all coalesced callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("Your account has been locked. Please contact support")]
    AccountLocked,

    #[error("Please verify your email before logging in")]
    EmailNotVerified,

    #[error("Your session has expired. Please log in again")]
    TokenExpired,

    #[error("Network error: {0}")]
    Network(String),

    #[error("An unknown error occurred: {0}")]
    Unknown(String),
}
