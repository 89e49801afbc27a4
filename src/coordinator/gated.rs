//! Permission-gated registration.
//!
//! # Flow
//!
//! 1. Ask for notification permission. A refusal is logged and reported but
//!    does not stop registration.
//! 2. Register with the given profile.
//! 3. If the profile opted into location updates, ask for location
//!    permission and start the tracker on grant.
//!
//! The result is always produced, whatever the permission outcomes.

use super::RegistrationCoordinator;
use crate::error::Result;
use crate::permission::{PermissionDomain, PermissionOutcome};
use crate::profile::SubscriberProfile;

/// Everything that happened during a gated registration.
#[derive(Debug, Clone, PartialEq)]
pub struct GatedRegistration {
    /// Answer to the notification prompt.
    pub notification: PermissionOutcome,
    /// Answer to the location prompt, if the profile asked for location.
    pub location: Option<PermissionOutcome>,
    /// Whether the location tracker was started.
    pub tracking_started: bool,
    /// Result of the registration itself.
    pub registration: Result<()>,
}

impl GatedRegistration {
    /// Registered with every requested permission granted.
    pub fn is_complete(&self) -> bool {
        self.registration.is_ok()
            && self.notification.is_granted()
            && self.location.map_or(true, PermissionOutcome::is_granted)
    }
}

impl RegistrationCoordinator {
    /// Registers the device behind the permission gates.
    pub async fn register_gated(&self, profile: SubscriberProfile) -> GatedRegistration {
        let notification = self
            .gateway
            .ensure_granted(PermissionDomain::Notification)
            .await;
        if !notification.is_granted() {
            log::warn!("Notification permission denied, registering anyway");
        }

        let wants_location = profile.location_updates;
        let registration = self.register(Some(profile)).await;
        if let Err(e) = &registration {
            log::warn!("Gated registration failed: {e}");
        }

        let mut tracking_started = false;
        let location = if wants_location {
            let outcome = self.gateway.ensure_granted(PermissionDomain::Location).await;
            if !outcome.is_granted() {
                log::warn!("Location permission denied, not tracking");
            } else if registration.is_ok() {
                match self.start_tracking() {
                    Ok(_) => tracking_started = true,
                    Err(e) => log::warn!("Location tracking not started: {e}"),
                }
            }
            Some(outcome)
        } else {
            None
        };

        GatedRegistration {
            notification,
            location,
            tracking_started,
            registration,
        }
    }

    /// Callback form of [`register_gated`](Self::register_gated).
    ///
    /// Runs the chain on the current tokio runtime and invokes `callback`
    /// exactly once with the result.
    pub fn register_gated_with<F>(&self, profile: SubscriberProfile, callback: F)
    where
        F: FnOnce(GatedRegistration) + Send + 'static,
    {
        let coordinator = self.clone();
        tokio::spawn(async move {
            callback(coordinator.register_gated(profile).await);
        });
    }
}
