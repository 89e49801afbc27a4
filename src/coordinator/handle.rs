//! Handle for talking to the registration service.
//!
//! `CoordinatorHandle` wraps the request channel and the current
//! cancellation epoch.
//!
//! # Epochs
//!
//! Every mutation is tagged with a child of the current epoch token.
//! [`unregister`](CoordinatorHandle::unregister) and
//! [`cancel_pending`](CoordinatorHandle::cancel_pending) cancel the epoch and
//! start a new one, so every mutation issued before them, queued or in
//! flight, is superseded and answers [`Error::Cancelled`].
//!
//! # Thread Safety
//!
//! `CoordinatorHandle` is `Clone + Send + Sync`; clones share the channel and
//! the epoch.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::service::CoordinatorRequest;
use crate::error::{Error, Result};
use crate::location::LocationSink;
use crate::profile::SubscriberProfile;
use crate::registration::{DeviceRegistration, RegistrationState};

/// Handle for sending requests to the registration service.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorRequest>,
    epoch: Arc<Mutex<CancellationToken>>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordinatorRequest>) -> Self {
        Self {
            tx,
            epoch: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Create a handle whose service is already gone.
    ///
    /// Every call fails with [`Error::ServiceUnavailable`].
    #[cfg(test)]
    #[must_use]
    pub(crate) fn mock() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self::new(tx)
    }

    /// Replaces the held profile. No network activity.
    pub async fn set_profile(&self, profile: SubscriberProfile) -> Result<()> {
        self.request(|reply| CoordinatorRequest::SetProfile { profile, reply })
            .await
    }

    /// Registers the device.
    ///
    /// With `Some(profile)` the profile becomes the held profile first;
    /// with `None` the held profile is used.
    ///
    /// # Errors
    ///
    /// - [`Error::ProfileNotSet`] if no profile is available
    /// - [`Error::Cancelled`] if superseded by `unregister`/`cancel_pending`
    /// - token, identity and directory failures of the chain
    pub async fn register(&self, profile: Option<SubscriberProfile>) -> Result<()> {
        let cancel = self.child_token();
        self.request(|reply| CoordinatorRequest::Register {
            profile,
            cancel,
            reply,
        })
        .await?
    }

    /// Replaces the profile stored in the directory, then the held one.
    pub async fn update(&self, profile: SubscriberProfile) -> Result<()> {
        let cancel = self.child_token();
        self.request(|reply| CoordinatorRequest::Update {
            profile,
            cancel,
            reply,
        })
        .await?
    }

    /// Deletes the device record and clears local state.
    ///
    /// Supersedes every mutation issued before it.
    pub async fn unregister(&self) -> Result<()> {
        self.cancel_pending();
        self.request(|reply| CoordinatorRequest::Unregister { reply })
            .await?
    }

    /// Pushes a position and patches the held profile's position.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] without a held profile; no request is made.
    pub async fn update_location(&self, lat: f64, lng: f64) -> Result<()> {
        let cancel = self.child_token();
        self.request(|reply| CoordinatorRequest::UpdateLocation {
            lat,
            lng,
            cancel,
            reply,
        })
        .await?
    }

    /// Tells the coordinator the push provider rotated the token.
    ///
    /// Returns `true` if the registration was re-submitted.
    pub async fn token_refreshed(&self, token: impl Into<String>) -> Result<bool> {
        let cancel = self.child_token();
        let token = token.into();
        self.request(|reply| CoordinatorRequest::TokenRefreshed {
            token,
            cancel,
            reply,
        })
        .await?
    }

    /// Reads the profile the directory holds for the current token.
    pub async fn fetch_remote_profile(&self) -> Result<SubscriberProfile> {
        self.request(|reply| CoordinatorRequest::FetchRemoteProfile { reply })
            .await?
    }

    /// Snapshot of the local registration record.
    pub async fn registration(&self) -> Result<DeviceRegistration> {
        self.request(|reply| CoordinatorRequest::Snapshot { reply })
            .await
    }

    /// The held profile, if any.
    pub async fn current_profile(&self) -> Result<Option<SubscriberProfile>> {
        Ok(self.registration().await?.profile)
    }

    /// The current state of the registration state machine.
    pub async fn state(&self) -> Result<RegistrationState> {
        Ok(self.registration().await?.state)
    }

    /// Supersedes every mutation issued so far.
    pub fn cancel_pending(&self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(|e| e.into_inner());
        epoch.cancel();
        *epoch = CancellationToken::new();
    }

    /// Stops the service. Later calls fail with `ServiceUnavailable`.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(CoordinatorRequest::Shutdown)
            .await
            .map_err(|_closed| Error::ServiceUnavailable)
    }

    fn child_token(&self) -> CancellationToken {
        self.epoch
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .child_token()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> CoordinatorRequest,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_closed| Error::ServiceUnavailable)?;

        reply_rx
            .await
            .map_err(|_dropped| Error::ServiceUnavailable)
    }
}

#[async_trait]
impl LocationSink for CoordinatorHandle {
    async fn push_location(&self, lat: f64, lng: f64) -> Result<()> {
        self.update_location(lat, lng).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_handle_reports_unavailable() {
        let handle = CoordinatorHandle::mock();
        assert_eq!(handle.state().await, Err(Error::ServiceUnavailable));
        assert_eq!(
            handle.register(Some(SubscriberProfile::new("u1"))).await,
            Err(Error::ServiceUnavailable)
        );
    }

    #[test]
    fn test_cancel_pending_cancels_issued_tokens_only() {
        let handle = CoordinatorHandle::mock();
        let earlier = handle.child_token();
        handle.cancel_pending();
        let later = handle.child_token();

        assert!(earlier.is_cancelled());
        assert!(!later.is_cancelled());
    }
}
