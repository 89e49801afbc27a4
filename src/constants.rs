//! Runtime-wide constants for pushreg.
//!
//! This module centralizes durations, capacities and fixed identifiers so
//! the components share one source of truth. Most values are defaults that
//! [`Config`](crate::Config) can override.
//!
//! # Categories
//!
//! - **Timeouts**: transport timeout for directory calls
//! - **Location**: sampling cadence of the location tracker
//! - **Channels**: actor mailbox sizing
//! - **Logging**: credential redaction

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// Connect/read timeout applied to every directory request.
///
/// There is no per-stage application timeout on top of this; a stalled call
/// stalls its chain until the transport gives up.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Location
// ============================================================================

/// Default sampling interval of the location tracker (balanced power).
pub const LOCATION_UPDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Fastest acceptable spacing between two pushed location fixes.
///
/// On-demand samples requested sooner than this after the previous push are
/// ignored.
pub const LOCATION_FASTEST_INTERVAL: Duration = Duration::from_secs(2 * 60);

// ============================================================================
// Channels
// ============================================================================

/// Mailbox capacity of the registration coordinator actor.
pub const COORDINATOR_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Logging
// ============================================================================

/// Number of leading device-token characters that may appear in logs.
pub const TOKEN_LOG_PREFIX_LEN: usize = 8;

/// Shorten a device token for logging.
///
/// Device tokens are capability credentials, so only a short prefix is ever
/// written to logs.
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(TOKEN_LOG_PREFIX_LEN).collect();
    if prefix.len() < token.len() {
        format!("{prefix}...")
    } else {
        prefix
    }
}
