//! Error types

use thiserror::Error;

/// Errors from fleet registry operations
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("session '{0}' is already registered")]
    NameTaken(String),
    #[error("no session named '{0}'")]
    UnknownSession(String),
    #[error("session name must not be empty")]
    EmptyName,
}

/// Errors surfaced by the network client collaborator.
///
/// Every variant is transient from the session's point of view; permanent
/// login failures arrive as `LoginResult` codes instead.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("connection timed out")]
    Timeout,
    #[error("no connection to the remote service")]
    NoConnection,
    #[error("remote service unavailable")]
    ServiceUnavailable,
    #[error("rate limited by the remote service")]
    RateLimited,
}

/// Errors surfaced by the web session collaborator
#[derive(Debug, Error)]
pub enum WebError {
    #[error("web session expired")]
    SessionExpired,
    #[error("request failed: {0}")]
    RequestFailed(String),
}
