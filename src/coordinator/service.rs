//! Registration service - single-owner actor for the device registration.
//!
//! The [`DeviceRegistration`] record is owned by one tokio task. Callers talk
//! to it through a [`CoordinatorHandle`], so overlapping mutations queue up
//! and run one at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐        ┌────────────────────────────────────┐
//! │ UI / host    │──req──▶│        REGISTRATION SERVICE        │
//! │              │◀──res──│                                    │
//! └──────────────┘        │  DeviceRegistration                │
//!                         │  token ─▶ routing id ─▶ directory  │
//! ┌──────────────┐        │  run() loop                        │
//! │ Location     │──req──▶│                                    │
//! │ tracker      │◀──res──│                                    │
//! └──────────────┘        └────────────────────────────────────┘
//! ```
//!
//! # Cancellation
//!
//! Every mutation carries a [`CancellationToken`]. A cancelled mutation
//! stops at the next stage boundary (or mid-request), restores the record it
//! started from and answers [`Error::Cancelled`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::handle::CoordinatorHandle;
use crate::constants::{redact_token, COORDINATOR_CHANNEL_CAPACITY};
use crate::directory::types::{RegisterDeviceRequest, UpdateDeviceRequest, UpdateLocationRequest};
use crate::directory::DirectoryClient;
use crate::error::{Error, Result};
use crate::identity::IdentityResolver;
use crate::profile::{GeoPosition, SubscriberProfile};
use crate::registration::{DeviceRegistration, RegistrationState};
use crate::token::TokenProvider;

/// Request types for the registration service.
///
/// Each variant includes a oneshot channel for returning the result.
pub(crate) enum CoordinatorRequest {
    /// Replace the held profile without network activity.
    SetProfile {
        profile: SubscriberProfile,
        reply: oneshot::Sender<()>,
    },

    /// Create the device record.
    Register {
        profile: Option<SubscriberProfile>,
        cancel: CancellationToken,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Replace the stored profile.
    Update {
        profile: SubscriberProfile,
        cancel: CancellationToken,
        reply: oneshot::Sender<Result<()>>,
    },

    /// Delete the device record.
    Unregister { reply: oneshot::Sender<Result<()>> },

    /// Push a position only.
    UpdateLocation {
        lat: f64,
        lng: f64,
        cancel: CancellationToken,
        reply: oneshot::Sender<Result<()>>,
    },

    /// The push provider rotated the token.
    TokenRefreshed {
        token: String,
        cancel: CancellationToken,
        reply: oneshot::Sender<Result<bool>>,
    },

    /// Read the record the directory holds.
    FetchRemoteProfile {
        reply: oneshot::Sender<Result<SubscriberProfile>>,
    },

    /// Copy of the local record.
    Snapshot {
        reply: oneshot::Sender<DeviceRegistration>,
    },

    /// Stop the service.
    Shutdown,
}

impl std::fmt::Debug for CoordinatorRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetProfile { profile, .. } => f
                .debug_struct("SetProfile")
                .field("subscriber_id", &profile.subscriber_id)
                .finish_non_exhaustive(),
            Self::Register { profile, .. } => f
                .debug_struct("Register")
                .field("with_profile", &profile.is_some())
                .finish_non_exhaustive(),
            Self::Update { profile, .. } => f
                .debug_struct("Update")
                .field("subscriber_id", &profile.subscriber_id)
                .finish_non_exhaustive(),
            Self::Unregister { .. } => write!(f, "Unregister"),
            Self::UpdateLocation { .. } => write!(f, "UpdateLocation"),
            Self::TokenRefreshed { token, .. } => f
                .debug_struct("TokenRefreshed")
                .field("token", &redact_token(token))
                .finish_non_exhaustive(),
            Self::FetchRemoteProfile { .. } => write!(f, "FetchRemoteProfile"),
            Self::Snapshot { .. } => write!(f, "Snapshot"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Dependencies of the registration service.
pub(crate) struct ServiceDeps {
    pub(crate) tenant_id: String,
    pub(crate) directory: DirectoryClient,
    pub(crate) identity: Arc<IdentityResolver>,
    pub(crate) tokens: Arc<dyn TokenProvider>,
    pub(crate) force_local_reset: bool,
}

/// The registration service task.
pub(crate) struct CoordinatorService {
    registration: DeviceRegistration,
    directory: DirectoryClient,
    identity: Arc<IdentityResolver>,
    tokens: Arc<dyn TokenProvider>,
    force_local_reset: bool,
}

impl CoordinatorService {
    /// Spawns the service on the current tokio runtime.
    ///
    /// Returns a handle that can be cloned freely.
    pub(crate) fn start(deps: ServiceDeps) -> CoordinatorHandle {
        let (tx, rx) = mpsc::channel(COORDINATOR_CHANNEL_CAPACITY);
        log::info!("Started registration service for tenant {}", deps.tenant_id);

        let service = Self {
            registration: DeviceRegistration::new(deps.tenant_id),
            directory: deps.directory,
            identity: deps.identity,
            tokens: deps.tokens,
            force_local_reset: deps.force_local_reset,
        };
        tokio::spawn(service.run(rx));

        CoordinatorHandle::new(tx)
    }

    /// Main service loop - processes requests until shutdown.
    async fn run(mut self, mut rx: mpsc::Receiver<CoordinatorRequest>) {
        log::debug!("Registration service ready, waiting for requests");

        while let Some(request) = rx.recv().await {
            match request {
                CoordinatorRequest::SetProfile { profile, reply } => {
                    self.registration.profile = Some(profile);
                    let _ = reply.send(());
                }

                CoordinatorRequest::Register {
                    profile,
                    cancel,
                    reply,
                } => {
                    let before = self.registration.clone();
                    let result = self.register(profile, None, &cancel).await;
                    let _ = reply.send(self.settle(before, result));
                }

                CoordinatorRequest::Update {
                    profile,
                    cancel,
                    reply,
                } => {
                    let before = self.registration.clone();
                    let result = self.update(profile, &cancel).await;
                    let _ = reply.send(self.settle(before, result));
                }

                CoordinatorRequest::Unregister { reply } => {
                    let result = self.unregister().await;
                    let _ = reply.send(result);
                }

                CoordinatorRequest::UpdateLocation {
                    lat,
                    lng,
                    cancel,
                    reply,
                } => {
                    let result = self.update_location(lat, lng, &cancel).await;
                    let _ = reply.send(result);
                }

                CoordinatorRequest::TokenRefreshed {
                    token,
                    cancel,
                    reply,
                } => {
                    let before = self.registration.clone();
                    let result = self.token_refreshed(&token, &cancel).await;
                    let _ = reply.send(self.settle(before, result));
                }

                CoordinatorRequest::FetchRemoteProfile { reply } => {
                    let _ = reply.send(self.fetch_remote_profile().await);
                }

                CoordinatorRequest::Snapshot { reply } => {
                    let _ = reply.send(self.registration.clone());
                }

                CoordinatorRequest::Shutdown => {
                    log::info!("Registration service shutting down");
                    break;
                }
            }
        }
    }

    /// Token, then routing id, then create the record.
    ///
    /// `pushed_token` replaces the provider lookup when the host already
    /// handed over the new token.
    async fn register(
        &mut self,
        profile: Option<SubscriberProfile>,
        pushed_token: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(profile) = profile {
            self.registration.profile = Some(profile);
        }
        let profile = self.registration.profile.clone().ok_or(Error::ProfileNotSet)?;

        let (token, routing_id) = self.prerequisites(pushed_token, cancel).await?;

        self.transition(RegistrationState::Submitting);
        let request = RegisterDeviceRequest {
            token: &token,
            app_id: &self.registration.tenant_id,
            client_id: &routing_id,
            user_info: &profile,
        };
        staged(cancel, self.directory.register_device(&request)).await?;

        log::info!(
            "Device {} registered for subscriber {}",
            redact_token(&token),
            profile.subscriber_id
        );
        self.registration.token = Some(token);
        self.transition(RegistrationState::Registered);
        Ok(())
    }

    /// Same prerequisites as register, then replace the stored profile.
    async fn update(&mut self, profile: SubscriberProfile, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (token, _routing_id) = self.prerequisites(None, cancel).await?;

        self.transition(RegistrationState::Submitting);
        let request = UpdateDeviceRequest {
            token: &token,
            user_info: &profile,
        };
        staged(cancel, self.directory.update_device(&request)).await?;

        log::info!("Profile of subscriber {} updated", profile.subscriber_id);
        self.registration.token = Some(token);
        self.registration.profile = Some(profile);
        self.transition(RegistrationState::Registered);
        Ok(())
    }

    /// Acquires the token and the routing id, in that order.
    async fn prerequisites(
        &mut self,
        pushed_token: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<(String, String)> {
        self.transition(RegistrationState::TokenPending);
        let token = match pushed_token {
            Some(token) => token,
            None => staged(cancel, self.tokens.current_token()).await?,
        };

        self.transition(RegistrationState::IdentityPending);
        let routing_id = staged(
            cancel,
            self.identity.resolve_routing_id(&self.registration.tenant_id),
        )
        .await?;
        self.registration.routing_id = Some(routing_id.clone());

        Ok((token, routing_id))
    }

    async fn unregister(&mut self) -> Result<()> {
        let result = match self.tokens.current_token().await {
            Ok(token) => self.directory.unregister_device(&token).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                log::info!("Device unregistered");
                self.registration.reset();
                Ok(())
            }
            Err(e) if self.force_local_reset => {
                log::warn!("Unregister failed ({e}), resetting local state anyway");
                self.registration.reset();
                Err(e)
            }
            Err(e) => {
                log::warn!("Unregister failed ({e}), keeping local profile");
                self.registration.state = RegistrationState::Failed;
                Err(e)
            }
        }
    }

    /// Location-only update; patches just the position on success.
    async fn update_location(&mut self, lat: f64, lng: f64, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if self.registration.profile.is_none() {
            return Err(Error::NotInitialized("no subscriber profile held".into()));
        }

        let token = staged(cancel, self.tokens.current_token()).await?;
        let request = UpdateLocationRequest {
            token: &token,
            lat,
            lng,
        };
        staged(cancel, self.directory.update_location(&request)).await?;

        if let Some(profile) = self.registration.profile.as_mut() {
            profile.position = Some(GeoPosition::new(lat, lng));
        }
        log::debug!("Position updated for {}", redact_token(&token));
        Ok(())
    }

    /// Re-submits the registration if the device is registered under an
    /// older token. Returns whether a re-registration happened.
    async fn token_refreshed(&mut self, token: &str, cancel: &CancellationToken) -> Result<bool> {
        let stale = self.registration.is_registered()
            && self.registration.token.as_deref() != Some(token);
        if !stale {
            return Ok(false);
        }
        log::info!("Device token rotated to {}, re-registering", redact_token(token));
        self.register(None, Some(token.to_string()), cancel)
            .await
            .map(|()| true)
    }

    async fn fetch_remote_profile(&self) -> Result<SubscriberProfile> {
        let token = self.tokens.current_token().await?;
        let record = self.directory.device_record(&token).await?;
        Ok(record.user_info)
    }

    /// Applies the failure policy of a mutation.
    ///
    /// Cancelled mutations restore the record they started from; other
    /// failures of an in-flight chain land in `Failed`.
    fn settle<T>(&mut self, before: DeviceRegistration, result: Result<T>) -> Result<T> {
        match &result {
            Err(Error::Cancelled) => {
                log::debug!("Registration chain superseded, restoring previous state");
                self.registration = before;
            }
            Err(e) if self.registration.state.is_in_flight() => {
                log::warn!("Registration chain failed: {e}");
                self.registration.state = RegistrationState::Failed;
            }
            _ => {}
        }
        result
    }

    fn transition(&mut self, state: RegistrationState) {
        log::debug!("Registration {:?} -> {state:?}", self.registration.state);
        self.registration.state = state;
    }
}

/// Runs one stage, abandoning it if `cancel` fires first.
async fn staged<T>(cancel: &CancellationToken, stage: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        result = stage => result,
    }
}
