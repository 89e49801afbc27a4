//! Registration coordinator.
//!
//! [`RegistrationCoordinator`] is the entry point for everything that
//! changes the device's registration: plain and permission-gated
//! registration, profile updates, unregistration and location pushes. It
//! combines:
//!
//! - [`CoordinatorHandle`] - the actor that owns the registration record
//! - the [`PermissionGateway`] consulted by gated registration
//! - the location tracker started after a location grant
//!
//! # Modules
//!
//! - [`service`] - the actor task
//! - [`handle`] - request handle with cancellation epochs
//! - [`gated`] - permission-gated registration

pub mod gated;
pub mod handle;
pub(crate) mod service;

use std::sync::{Arc, Mutex};

pub use gated::GatedRegistration;
pub use handle::CoordinatorHandle;

use crate::error::{Error, Result};
use crate::location::{LocationSource, LocationTracker, TrackerConfig, TrackerHandle};
use crate::permission::PermissionGateway;
use crate::profile::SubscriberProfile;
use crate::registration::{DeviceRegistration, RegistrationState};

/// Orchestrates registration, permissions and location tracking.
///
/// Cheap to clone; clones share the actor, the gateway and the tracker.
#[derive(Clone)]
pub struct RegistrationCoordinator {
    handle: CoordinatorHandle,
    gateway: Arc<PermissionGateway>,
    location_source: Option<Arc<dyn LocationSource>>,
    tracker_config: TrackerConfig,
    tracker: Arc<Mutex<Option<TrackerHandle>>>,
}

impl std::fmt::Debug for RegistrationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationCoordinator")
            .field("has_location_source", &self.location_source.is_some())
            .field("tracker_config", &self.tracker_config)
            .field("tracking", &self.is_tracking())
            .finish_non_exhaustive()
    }
}

impl RegistrationCoordinator {
    pub(crate) fn new(
        handle: CoordinatorHandle,
        gateway: Arc<PermissionGateway>,
        location_source: Option<Arc<dyn LocationSource>>,
        tracker_config: TrackerConfig,
    ) -> Self {
        Self {
            handle,
            gateway,
            location_source,
            tracker_config,
            tracker: Arc::new(Mutex::new(None)),
        }
    }

    /// The underlying actor handle.
    pub fn handle(&self) -> &CoordinatorHandle {
        &self.handle
    }

    /// Replaces the held profile without network activity.
    pub async fn set_profile(&self, profile: SubscriberProfile) -> Result<()> {
        self.handle.set_profile(profile).await
    }

    /// Registers the device. See [`CoordinatorHandle::register`].
    pub async fn register(&self, profile: Option<SubscriberProfile>) -> Result<()> {
        self.handle.register(profile).await
    }

    /// Replaces the stored profile. See [`CoordinatorHandle::update`].
    pub async fn update(&self, profile: SubscriberProfile) -> Result<()> {
        self.handle.update(profile).await
    }

    /// Stops location tracking and unregisters the device.
    ///
    /// Supersedes every earlier mutation. Whether local state survives a
    /// failed delete depends on `force_local_reset`; the error is returned
    /// either way.
    pub async fn unregister(&self) -> Result<()> {
        self.stop_tracking();
        self.handle.unregister().await
    }

    /// Pushes a position. See [`CoordinatorHandle::update_location`].
    pub async fn update_location(&self, lat: f64, lng: f64) -> Result<()> {
        self.handle.update_location(lat, lng).await
    }

    /// Handles a push-provider token rotation.
    pub async fn token_refreshed(&self, token: impl Into<String>) -> Result<bool> {
        self.handle.token_refreshed(token).await
    }

    /// The held profile, if any.
    pub async fn current_profile(&self) -> Result<Option<SubscriberProfile>> {
        self.handle.current_profile().await
    }

    /// Current registration state.
    pub async fn state(&self) -> Result<RegistrationState> {
        self.handle.state().await
    }

    /// Snapshot of the registration record.
    pub async fn registration(&self) -> Result<DeviceRegistration> {
        self.handle.registration().await
    }

    /// The profile the directory holds for the current token.
    pub async fn fetch_remote_profile(&self) -> Result<SubscriberProfile> {
        self.handle.fetch_remote_profile().await
    }

    /// Supersedes every mutation issued so far.
    pub fn cancel_pending(&self) {
        self.handle.cancel_pending();
    }

    /// Starts location tracking, replacing a running tracker.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if no location source was configured
    /// - [`Error::PermissionDenied`] if location is not granted
    pub fn start_tracking(&self) -> Result<TrackerHandle> {
        let source = self
            .location_source
            .clone()
            .ok_or_else(|| Error::NotInitialized("no location source configured".into()))?;

        let tracker = LocationTracker::start(
            self.tracker_config,
            Arc::clone(&self.gateway),
            source,
            Arc::new(self.handle.clone()),
        )?;

        let previous = self.tracker_slot().replace(tracker.clone());
        if let Some(previous) = previous {
            previous.stop();
        }
        Ok(tracker)
    }

    /// Stops location tracking if it is running.
    pub fn stop_tracking(&self) {
        if let Some(tracker) = self.tracker_slot().take() {
            tracker.stop();
        }
    }

    /// Whether a tracker is currently sampling.
    pub fn is_tracking(&self) -> bool {
        self.tracker_slot()
            .as_ref()
            .is_some_and(TrackerHandle::is_running)
    }

    fn tracker_slot(&self) -> std::sync::MutexGuard<'_, Option<TrackerHandle>> {
        self.tracker.lock().unwrap_or_else(|e| e.into_inner())
    }
}
