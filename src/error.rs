//! Error types for the chat hub
//!
//! Defines application-level errors, token validation errors and
//! mailbox send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers fatal transport errors as well as session-local rejections.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The hub task is gone (fatal - internal channel broken)
    #[error("Hub closed")]
    HubClosed,

    /// Nickname length outside the allowed range
    #[error("Invalid nickname: {0:?}")]
    InvalidNickname(String),

    /// Idle timeout elapsed on a line transport
    #[error("Connection idle for too long")]
    IdleTimeout,

    /// Bad configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Reconnection token validation errors
///
/// None of these are fatal: a failed validation downgrades the session
/// to a freshly minted identity.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `uid` separator in the token
    #[error("Token has no uid separator")]
    MissingSeparator,

    /// Signature segment is not valid base64
    #[error("Token signature is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// uid segment is not a positive integer
    #[error("Token uid is invalid: {0:?}")]
    InvalidUid(String),

    /// Signature does not match nickname and uid
    #[error("Token signature mismatch")]
    SignatureMismatch,
}

/// Message send errors
///
/// Occurs when attempting to deliver into a closed mailbox.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the mailbox has been closed
    #[error("Mailbox closed")]
    MailboxClosed,
}
