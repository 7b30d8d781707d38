//! Error types for engine operations.

use thiserror::Error;

/// Errors produced by engine components and collaborators.
#[derive(Debug, Error)]
pub enum SlaError {
    /// An entry point or option received a malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A named trunk or station does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The dialer could not create or start a dial.
    #[error("dialer unavailable: {0}")]
    DialerUnavailable(String),
    /// The conference service rejected an operation.
    #[error("conference error: {0}")]
    Conference(String),
    /// The dialplan rejected an extension change.
    #[error("dialplan error: {0}")]
    Dialplan(String),
    /// A worker thread could not be started.
    #[error("spawn failed: {0}")]
    Spawn(String),
    /// The engine has been shut down.
    #[error("engine shut down")]
    Shutdown,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
