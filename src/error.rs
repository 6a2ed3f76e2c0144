//! src/error.rs
//!
//! Defines the library's custom, comprehensive `Error` enum using `thiserror`.
//! Handler-level errors cross the HTTP surface through `ApiError`, a thin
//! wrapper implementing `axum::response::IntoResponse` so `Error` never has
//! to know about status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize or deserialize: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tokio task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid peer key '{0}': expected ip:port")]
    InvalidPeerKey(String),

    #[error("store invariant violated: {0}")]
    StoreInvariant(String),

    #[error("node is not running")]
    NodeNotRunning,

    #[error("node is already running")]
    NodeAlreadyRunning,

    #[error("quorum not reached after {attempts} attempts")]
    QuorumNotReached { attempts: u32 },
}

/// Wrapper that turns any library `Error` into an HTTP response. Peer
/// exchange failures surface as 500, which the initiating side of an
/// anti-entropy exchange treats as a failure against the peer it was
/// talking to; a missing/not-yet-started node surfaces as 409 so callers
/// can tell "not running" apart from a bug.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NodeNotRunning => StatusCode::CONFLICT,
            Error::NodeAlreadyRunning => StatusCode::CONFLICT,
            Error::InvalidPeerKey(_) | Error::StoreInvariant(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(error = %self.0, status = %status, "request failed");
        (status, self.0.to_string()).into_response()
    }
}
