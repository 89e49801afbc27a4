//! The sampling loop.
//!
//! # Lifecycle
//!
//! ```text
//! start() ── permission? ──no──▶ Err(PermissionDenied), nothing spawned
//!               │
//!              yes
//!               ▼
//!         ┌── tick / request_sample ◀──────────────┐
//!         │     permission still held? ──no──▶ exit │
//!         │     fix from source                     │
//!         │     push to sink ── NotInitialized ──▶ exit
//!         └─────────────────────────────────────────┘
//!   stop() ──▶ exit
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{LocationSink, LocationSource};
use crate::constants::{LOCATION_FASTEST_INTERVAL, LOCATION_UPDATE_INTERVAL};
use crate::error::{Error, Result};
use crate::permission::{PermissionDomain, PermissionGateway, PermissionKind};

/// Sampling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Regular sampling interval.
    pub interval: Duration,
    /// Minimum spacing between two pushed fixes for on-demand samples.
    pub fastest_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            interval: LOCATION_UPDATE_INTERVAL,
            fastest_interval: LOCATION_FASTEST_INTERVAL,
        }
    }
}

/// Starts sampling loops.
#[derive(Debug)]
pub struct LocationTracker;

impl LocationTracker {
    /// Starts a sampling loop on the current tokio runtime.
    ///
    /// The first sample is taken immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if the sampling interval is zero
    /// - [`Error::PermissionDenied`] if foreground location is not granted.
    ///   Nothing is retried; call again after the grant.
    pub fn start(
        config: TrackerConfig,
        gateway: Arc<PermissionGateway>,
        source: Arc<dyn LocationSource>,
        sink: Arc<dyn LocationSink>,
    ) -> Result<TrackerHandle> {
        if config.interval.is_zero() {
            return Err(Error::NotInitialized(
                "location sampling interval must be non-zero".into(),
            ));
        }
        if !gateway.is_granted(PermissionKind::LocationForeground) {
            log::warn!("Location tracking not started: permission missing");
            return Err(Error::PermissionDenied(PermissionDomain::Location));
        }

        let handle = TrackerHandle {
            cancel: CancellationToken::new(),
            wake: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(true)),
        };

        let sampler = Sampler {
            config,
            gateway,
            source,
            sink,
            handle: handle.clone(),
        };
        tokio::spawn(sampler.run());

        log::info!(
            "Location tracking started (every {}s, fastest {}s)",
            config.interval.as_secs(),
            config.fastest_interval.as_secs()
        );
        Ok(handle)
    }
}

/// Control handle for a running sampling loop.
///
/// Clones control the same loop. Dropping the handle does not stop it.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    cancel: CancellationToken,
    wake: Arc<Notify>,
    running: Arc<AtomicBool>,
}

impl TrackerHandle {
    /// Stops the loop. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the loop is still sampling.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    /// Asks for an out-of-schedule sample.
    ///
    /// Ignored if the previous fix was pushed less than the fastest interval
    /// ago.
    pub fn request_sample(&self) {
        self.wake.notify_one();
    }

    /// Waits until the loop has exited, for whatever reason.
    pub async fn stopped(&self) {
        self.cancel.cancelled().await;
    }
}

struct Sampler {
    config: TrackerConfig,
    gateway: Arc<PermissionGateway>,
    source: Arc<dyn LocationSource>,
    sink: Arc<dyn LocationSink>,
    handle: TrackerHandle,
}

impl Sampler {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_push: Option<Instant> = None;

        loop {
            let on_demand = tokio::select! {
                () = self.handle.cancel.cancelled() => break,
                _ = ticker.tick() => false,
                () = self.handle.wake.notified() => true,
            };

            if on_demand
                && last_push.is_some_and(|at| at.elapsed() < self.config.fastest_interval)
            {
                log::debug!("On-demand location sample throttled");
                continue;
            }

            if !self.gateway.is_granted(PermissionKind::LocationForeground) {
                log::warn!("Location permission revoked, stopping tracker");
                break;
            }

            let fix = match self.source.current_fix().await {
                Ok(Some(fix)) => fix,
                Ok(None) => {
                    log::debug!("No location fix available");
                    continue;
                }
                Err(e) => {
                    log::warn!("Location source failed: {e}");
                    continue;
                }
            };

            match self.sink.push_location(fix.lat, fix.lng).await {
                Ok(()) => {
                    log::debug!("Location pushed ({:.4}, {:.4})", fix.lat, fix.lng);
                    last_push = Some(Instant::now());
                }
                Err(Error::NotInitialized(reason)) => {
                    log::info!("Stopping tracker: {reason}");
                    break;
                }
                Err(Error::Cancelled) => {
                    log::debug!("Location update superseded");
                }
                Err(e) => {
                    log::warn!("Location update failed: {e}");
                }
            }
        }

        self.handle.running.store(false, Ordering::SeqCst);
        self.handle.cancel.cancel();
        log::info!("Location tracking stopped");
    }
}
