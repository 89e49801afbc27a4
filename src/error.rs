//! Error taxonomy for the registration runtime.
//!
//! Every operation reports failures to its immediate caller through
//! [`Error`]. Nothing in the runtime retries on its own; callers can use
//! [`Error::is_transient`] to decide whether offering a retry makes sense.

use thiserror::Error;

use crate::permission::PermissionDomain;

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime errors surfaced to the host application.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Transport-level failure: no HTTP response was received.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The directory answered with a non-2xx status.
    #[error("Directory returned HTTP {code}: {body}")]
    ServerError {
        /// HTTP status code.
        code: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// A 2xx response whose body could not be decoded.
    #[error("Malformed directory response: {0}")]
    MalformedResponse(String),

    /// The user (or platform) refused a permission the operation requires.
    #[error("Permission denied: {0}")]
    PermissionDenied(PermissionDomain),

    /// Operation invoked before the runtime has what it needs.
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// `register` was called without a profile and none is held.
    #[error("No subscriber profile set")]
    ProfileNotSet,

    /// The push transport provider could not yield a device token.
    #[error("Device token unavailable: {0}")]
    TokenUnavailable(String),

    /// The directory has no routing id for this tenant.
    #[error("Unknown tenant id: {0}")]
    InvalidTenantId(String),

    /// The operation was superseded by a later one before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// The coordinator task has shut down.
    #[error("Registration service unavailable")]
    ServiceUnavailable,
}

impl Error {
    /// Returns `true` for failures where trying again later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkFailure(_) | Self::TokenUnavailable(_) => true,
            Self::ServerError { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the directory reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ServerError { code: 404, .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::NetworkFailure(err.to_string())
        }
    }
}
