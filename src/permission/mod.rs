//! OS permission gates.
//!
//! Two independent domains are gated: notification delivery and location
//! access. The OS answers prompts asynchronously and at arbitrary times, so
//! every prompt carries a [`CorrelationId`] that routes the reply back to the
//! callers waiting on it.
//!
//! # Modules
//!
//! - [`gateway`] - request sequencing and reply correlation
//! - [`prompter`] - host-side prompt delivery

pub mod gateway;
pub mod prompter;

use std::fmt;

use uuid::Uuid;

pub use gateway::PermissionGateway;
pub use prompter::{ChannelPrompter, PermissionPrompter, PromptRequest};

/// A permission domain as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionDomain {
    /// Posting notifications.
    Notification,
    /// Reading the device position (foreground, plus background if the
    /// platform separates it).
    Location,
}

impl PermissionDomain {
    /// The kind prompted first when this domain is requested.
    pub fn primary_kind(self) -> PermissionKind {
        match self {
            Self::Notification => PermissionKind::Notification,
            Self::Location => PermissionKind::LocationForeground,
        }
    }
}

impl fmt::Display for PermissionDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notification => f.write_str("notification delivery"),
            Self::Location => f.write_str("location access"),
        }
    }
}

/// An individual OS permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    /// Notification delivery.
    Notification,
    /// Location while the app is in use.
    LocationForeground,
    /// Location while the app is in the background.
    LocationBackground,
}

impl PermissionKind {
    /// The domain this kind belongs to.
    pub fn domain(self) -> PermissionDomain {
        match self {
            Self::Notification => PermissionDomain::Notification,
            Self::LocationForeground | Self::LocationBackground => PermissionDomain::Location,
        }
    }
}

/// Recorded state of one permission kind.
///
/// `Denied` is not terminal; the next request prompts again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    /// Never requested in this process.
    #[default]
    Unknown,
    /// A prompt is outstanding.
    Requesting,
    /// The OS granted it.
    Granted,
    /// The OS or the user refused it (or it was revoked).
    Denied,
}

/// Result of [`PermissionGateway::ensure_granted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Everything the domain needs was granted.
    Granted,
    /// The primary permission was refused.
    Denied,
    /// Foreground location was granted but background was refused.
    ///
    /// Counts as granted.
    GrantedForegroundOnly,
}

impl PermissionOutcome {
    /// Returns `true` unless the primary permission was refused.
    pub fn is_granted(self) -> bool {
        !matches!(self, Self::Denied)
    }
}

/// Identifies one outstanding OS prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
