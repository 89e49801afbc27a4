//! Periodic location sampling.
//!
//! The tracker pulls fixes from a host [`LocationSource`] and pushes each one
//! into a [`LocationSink`], which in the runtime is the registration
//! coordinator's location-only update.

pub mod tracker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use tracker::{LocationTracker, TrackerConfig, TrackerHandle};

/// One position fix from the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Horizontal accuracy in meters, if the platform reports it.
    pub accuracy_m: Option<f32>,
    /// When the platform took the fix.
    pub taken_at: DateTime<Utc>,
}

impl GeoFix {
    /// Creates a fix taken now with unknown accuracy.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            accuracy_m: None,
            taken_at: Utc::now(),
        }
    }
}

/// Host location provider.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Returns the current fix, or `None` if the platform has none yet.
    async fn current_fix(&self) -> Result<Option<GeoFix>>;
}

/// Receiver of sampled positions.
#[async_trait]
pub trait LocationSink: Send + Sync {
    /// Pushes a position to the directory.
    ///
    /// [`Error::NotInitialized`](crate::Error::NotInitialized) tells the
    /// tracker there is no registration left to update.
    async fn push_location(&self, lat: f64, lng: f64) -> Result<()>;
}
