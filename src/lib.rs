//! pushreg - device registration and notification enablement runtime.
//!
//! This crate establishes a permission-gated identity for a device against a
//! remote notification directory, keeps the subscriber profile in sync with
//! it and exposes the history of delivered notifications.
//!
//! # Architecture
//!
//! The crate is built around an explicitly constructed [`Runtime`]:
//!
//! - **IdentityResolver** - tenant id to routing id, cached
//! - **PermissionGateway** - OS permission prompts and reply correlation
//! - **LocationTracker** - periodic position sampling
//! - **RegistrationCoordinator** - actor owning the registration state machine
//! - **HistoryStore** - delivered notifications with optimistic deletes
//!
//! The host supplies the push provider ([`TokenProvider`]), the OS
//! permission bridge ([`PermissionPrompter`]) and optionally a
//! [`LocationSource`].
//!
//! # Modules
//!
//! - [`coordinator`] - registration orchestration
//! - [`permission`] - permission gates
//! - [`location`] - location tracking
//! - [`history`] - notification history
//! - [`directory`] - directory HTTP client
//! - [`config`] - configuration loading/saving

pub mod channel;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod history;
pub mod identity;
pub mod interests;
pub mod location;
pub mod permission;
pub mod profile;
pub mod registration;
pub mod runtime;
pub mod token;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{CoordinatorHandle, GatedRegistration, RegistrationCoordinator};
pub use directory::{Delivery, DirectoryClient, HistoryEntry};
pub use error::{Error, Result};
pub use history::{HistoryStore, HistoryView};
pub use identity::IdentityResolver;
pub use interests::{InterestCatalog, InterestOption};
pub use location::{GeoFix, LocationSource, TrackerConfig, TrackerHandle};
pub use permission::{
    ChannelPrompter, PermissionDomain, PermissionGateway, PermissionKind, PermissionOutcome,
    PermissionPrompter, PermissionState, PromptRequest,
};
pub use profile::{GeoPosition, SubscriberProfile};
pub use registration::{DeviceRegistration, RegistrationState};
pub use runtime::{Runtime, RuntimeBuilder};
pub use token::{StaticTokenProvider, TokenProvider};
