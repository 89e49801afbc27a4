//! Device registration record and its state machine.
//!
//! # State machine
//!
//! ```text
//! Idle ─▶ TokenPending ─▶ IdentityPending ─▶ Submitting ─▶ Registered
//!              │                 │                │            │
//!              └────────────┬────┴────────────────┘            │
//!                           ▼                                  │
//!                        Failed ──register──▶ TokenPending     │
//!                                                              │
//! Idle ◀────────────────────────── unregister ─────────────────┘
//! ```
//!
//! The record lives only in memory. After a restart the host re-supplies the
//! token (through its provider) and the tenant id, and the runtime derives
//! everything else again.

use crate::constants::redact_token;
use crate::profile::SubscriberProfile;

/// Where the device is in the registration sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationState {
    /// Nothing submitted (or unregistered).
    #[default]
    Idle,
    /// Waiting for the push provider's token.
    TokenPending,
    /// Waiting for the routing id.
    IdentityPending,
    /// Registration request in flight.
    Submitting,
    /// The directory holds a record for the device.
    Registered,
    /// The last chain failed; the next `register` starts over.
    Failed,
}

impl RegistrationState {
    /// Returns `true` while a chain is running.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::TokenPending | Self::IdentityPending | Self::Submitting
        )
    }
}

/// Everything the coordinator knows about this device.
#[derive(Clone, PartialEq, Default)]
pub struct DeviceRegistration {
    /// Token the device was last submitted under.
    pub token: Option<String>,
    /// Tenant the device belongs to.
    pub tenant_id: String,
    /// Routing id resolved from the tenant id.
    pub routing_id: Option<String>,
    /// Held subscriber profile.
    pub profile: Option<SubscriberProfile>,
    /// Current state.
    pub state: RegistrationState,
}

// The token is a credential; keep it out of Debug output.
impl std::fmt::Debug for DeviceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistration")
            .field("token", &self.token.as_deref().map(redact_token))
            .field("tenant_id", &self.tenant_id)
            .field("routing_id", &self.routing_id)
            .field("profile", &self.profile)
            .field("state", &self.state)
            .finish()
    }
}

impl DeviceRegistration {
    /// Creates an idle record for `tenant_id`.
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if the directory holds a record for the device.
    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// Drops the profile and token and returns to `Idle`.
    ///
    /// The routing id is kept; it is fixed per tenant.
    pub fn reset(&mut self) {
        self.token = None;
        self.profile = None;
        self.state = RegistrationState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_routing_id() {
        let mut registration = DeviceRegistration::new("T1");
        registration.token = Some("tok-abc".into());
        registration.routing_id = Some("C1".into());
        registration.profile = Some(SubscriberProfile::new("u1"));
        registration.state = RegistrationState::Registered;
        assert!(registration.is_registered());

        registration.reset();
        assert_eq!(registration.state, RegistrationState::Idle);
        assert!(registration.profile.is_none());
        assert!(registration.token.is_none());
        assert_eq!(registration.routing_id.as_deref(), Some("C1"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut registration = DeviceRegistration::new("T1");
        registration.token = Some("tok-abcdefghijkl".into());
        let debug = format!("{registration:?}");
        assert!(debug.contains("tok-abcd..."));
        assert!(!debug.contains("tok-abcdefghijkl"));
    }

    #[test]
    fn test_in_flight_states() {
        assert!(RegistrationState::Submitting.is_in_flight());
        assert!(!RegistrationState::Registered.is_in_flight());
        assert!(!RegistrationState::Failed.is_in_flight());
    }
}
