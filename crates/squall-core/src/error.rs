//! Error types for squall-core

use thiserror::Error;

/// Result type alias for squall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the squall dispatch engine
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input (bad percent-encoding, bad numeric header value,
    /// undecodable body). Fails the current request only.
    #[error("parse error: {0}")]
    Parse(String),

    /// State-contract violation (double body consumption, registration
    /// after startup, access to an invalidated session). Programmer error.
    #[error("invalid state: {0}")]
    State(String),

    /// Application code failed during dispatch. Distinct from framework
    /// failures so adapters can tell the two apart.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a chain/handler failure into the reportable dispatch error.
    /// Already-wrapped errors pass through unchanged.
    pub fn into_dispatch(self) -> Error {
        match self {
            Error::Dispatch(_) => self,
            other => Error::Dispatch(DispatchError::new(other)),
        }
    }
}

/// Reportable wrapper for failures raised by handlers or middleware.
///
/// The dispatch engine returns this instead of the raw error so platform
/// adapters can distinguish "the application failed" from "the framework
/// failed".
#[derive(Debug, Error)]
#[error("request dispatch failed: {source}")]
pub struct DispatchError {
    #[source]
    source: Box<Error>,
}

impl DispatchError {
    pub fn new(source: Error) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// The underlying application failure.
    pub fn source_error(&self) -> &Error {
        &self.source
    }
}
