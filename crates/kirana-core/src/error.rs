//! Workspace-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KiranaError>;

/// Errors surfaced by any Kirana component.
#[derive(Debug, Error)]
pub enum KiranaError {
    /// Configuration loading/parsing problems.
    #[error("config error: {0}")]
    Config(String),

    /// Persistence failures (SQLite).
    #[error("store error: {0}")]
    Store(String),

    /// Outbound gateway failures (WhatsApp Cloud API).
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Rejected operator input (missing name, missing message content, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// Campaign status transition not allowed by the state machine.
    #[error("illegal transition: {0}")]
    Transition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
