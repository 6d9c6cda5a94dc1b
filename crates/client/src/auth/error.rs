//! Authentication error types.

use thiserror::Error;

/// Errors that end or prevent an authenticated session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Login rejected the supplied credentials.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The backend rejected the request's credentials (401/403).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The session was replaced or logged out while the call was in flight.
    #[error("session ended while the request was in flight")]
    SessionEnded,
}

/// Outcome of a failed refresh.
///
/// Cloneable so every caller waiting on the same refresh receives the same
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// No refresh token is held.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The backend refused the refresh token.
    #[error("refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The refresh call never completed.
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// The refresh response could not be decoded.
    #[error("malformed refresh response: {0}")]
    Malformed(String),

    /// Logout or a new login happened while the refresh was in flight.
    #[error("session ended during refresh")]
    SessionEnded,
}
