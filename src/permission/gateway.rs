//! Permission request sequencing.
//!
//! # State machine
//!
//! ```text
//! Unknown ──ensure_granted──▶ Requesting ──on_os_reply──▶ Granted | Denied
//!    ▲                                                        │
//!    └──────────────── Denied is re-requested ◀───────────────┘
//! ```
//!
//! Location adds a background stage: after a foreground grant on platforms
//! that separate the two, a second prompt is issued under a fresh
//! correlation id. A background refusal still completes as
//! [`PermissionOutcome::GrantedForegroundOnly`].
//!
//! At most one prompt per domain is outstanding. Callers arriving while one
//! is in flight join its waiter queue and are all notified by the reply.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;

use super::{
    CorrelationId, PermissionDomain, PermissionKind, PermissionOutcome, PermissionPrompter,
    PermissionState,
};

type Waiter = Box<dyn FnOnce(PermissionOutcome) + Send>;

struct PendingRequest {
    kind: PermissionKind,
    waiters: Vec<Waiter>,
}

#[derive(Default)]
struct GatewayState {
    states: HashMap<PermissionKind, PermissionState>,
    pending: HashMap<CorrelationId, PendingRequest>,
    in_flight: HashMap<PermissionDomain, CorrelationId>,
}

/// Sequences permission prompts and routes OS replies to their callers.
///
/// Share it behind an [`Arc`]; every method takes `&self`.
pub struct PermissionGateway {
    prompter: Arc<dyn PermissionPrompter>,
    state: Mutex<GatewayState>,
}

impl std::fmt::Debug for PermissionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("PermissionGateway")
            .field("states", &state.states)
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

/// What to do once the lock is released.
enum Next {
    Prompt(PermissionKind, CorrelationId),
    Complete(Vec<Waiter>, PermissionOutcome),
    Nothing,
}

impl PermissionGateway {
    /// Creates a gateway that prompts through `prompter`.
    pub fn new(prompter: Arc<dyn PermissionPrompter>) -> Self {
        Self {
            prompter,
            state: Mutex::new(GatewayState::default()),
        }
    }

    /// Makes sure `domain` is granted, then invokes `callback` exactly once.
    ///
    /// If the OS already grants everything the domain needs, the callback
    /// runs before this returns. Otherwise a prompt is issued (or the
    /// in-flight one for the same domain is joined) and the callback runs
    /// from [`on_os_reply`](Self::on_os_reply).
    pub fn ensure_granted_with<F>(&self, domain: PermissionDomain, callback: F)
    where
        F: FnOnce(PermissionOutcome) + Send + 'static,
    {
        let waiter: Waiter = Box::new(callback);
        let next = {
            let mut state = self.lock();

            let joined = match state.in_flight.get(&domain).copied() {
                Some(correlation) => state.pending.get_mut(&correlation),
                None => None,
            };
            if let Some(request) = joined {
                log::debug!("Joining in-flight {domain} request");
                request.waiters.push(waiter);
                Next::Nothing
            } else {
                self.begin(&mut state, domain, vec![waiter])
            }
        };
        self.run(next);
    }

    /// Async form of [`ensure_granted_with`](Self::ensure_granted_with).
    ///
    /// Resolves to `Denied` if the gateway is dropped before the OS answers.
    pub async fn ensure_granted(&self, domain: PermissionDomain) -> PermissionOutcome {
        let (tx, rx) = oneshot::channel();
        self.ensure_granted_with(domain, move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap_or(PermissionOutcome::Denied)
    }

    /// Delivers the OS answer for the prompt identified by `correlation`.
    ///
    /// Returns `false` and changes nothing if no prompt with that id is
    /// outstanding (a stale or duplicate reply).
    pub fn on_os_reply(&self, correlation: CorrelationId, granted: bool) -> bool {
        let next = {
            let mut state = self.lock();
            let Some(request) = state.pending.remove(&correlation) else {
                log::debug!("Dropping stale permission reply {correlation}");
                return false;
            };
            let domain = request.kind.domain();
            if state.in_flight.get(&domain) == Some(&correlation) {
                state.in_flight.remove(&domain);
            }
            let recorded = if granted {
                PermissionState::Granted
            } else {
                PermissionState::Denied
            };
            state.states.insert(request.kind, recorded);

            match (request.kind, granted) {
                (PermissionKind::LocationForeground, true) if self.background_missing() => {
                    log::debug!("Foreground location granted, requesting background");
                    Next::Prompt(
                        PermissionKind::LocationBackground,
                        Self::start(&mut state, PermissionKind::LocationBackground, request.waiters),
                    )
                }
                (PermissionKind::LocationBackground, false) => {
                    log::warn!("Background location denied, continuing with foreground only");
                    Next::Complete(request.waiters, PermissionOutcome::GrantedForegroundOnly)
                }
                (kind, true) => {
                    log::info!("Permission {kind:?} granted");
                    Next::Complete(request.waiters, PermissionOutcome::Granted)
                }
                (kind, false) => {
                    log::warn!("Permission {kind:?} denied");
                    Next::Complete(request.waiters, PermissionOutcome::Denied)
                }
            }
        };
        self.run(next);
        true
    }

    /// Re-reads the OS grant for `kind`.
    ///
    /// A kind recorded as granted that the OS no longer grants is downgraded
    /// to [`PermissionState::Denied`].
    pub fn is_granted(&self, kind: PermissionKind) -> bool {
        let mut state = self.lock();
        self.refresh(&mut state, kind)
    }

    /// Returns the recorded state of `kind` without consulting the OS.
    pub fn state(&self, kind: PermissionKind) -> PermissionState {
        self.lock().states.get(&kind).copied().unwrap_or_default()
    }

    /// Decides the first step of a new request for `domain`.
    fn begin(
        &self,
        state: &mut GatewayState,
        domain: PermissionDomain,
        waiters: Vec<Waiter>,
    ) -> Next {
        let primary = domain.primary_kind();
        if !self.refresh(state, primary) {
            let correlation = Self::start(state, primary, waiters);
            return Next::Prompt(primary, correlation);
        }
        if domain == PermissionDomain::Location && self.background_missing() {
            let background = PermissionKind::LocationBackground;
            let correlation = Self::start(state, background, waiters);
            return Next::Prompt(background, correlation);
        }
        Next::Complete(waiters, PermissionOutcome::Granted)
    }

    /// Registers a pending request and marks `kind` as requesting.
    fn start(state: &mut GatewayState, kind: PermissionKind, waiters: Vec<Waiter>) -> CorrelationId {
        let correlation = CorrelationId::new();
        state.states.insert(kind, PermissionState::Requesting);
        state.pending.insert(correlation, PendingRequest { kind, waiters });
        state.in_flight.insert(kind.domain(), correlation);
        correlation
    }

    fn refresh(&self, state: &mut GatewayState, kind: PermissionKind) -> bool {
        if self.prompter.is_granted(kind) {
            state.states.insert(kind, PermissionState::Granted);
            return true;
        }
        if state.states.get(&kind) == Some(&PermissionState::Granted) {
            log::warn!("Permission {kind:?} was revoked");
            state.states.insert(kind, PermissionState::Denied);
        }
        false
    }

    fn background_missing(&self) -> bool {
        self.prompter.requires_background_grant()
            && !self.prompter.is_granted(PermissionKind::LocationBackground)
    }

    fn run(&self, next: Next) {
        match next {
            Next::Prompt(kind, correlation) => {
                log::debug!("Prompting for {kind:?} ({correlation})");
                if let Err(e) = self.prompter.prompt(kind, correlation) {
                    log::warn!("Permission prompt for {kind:?} not shown: {e}");
                    self.abandon(kind, correlation);
                }
            }
            Next::Complete(waiters, outcome) => {
                for waiter in waiters {
                    waiter(outcome);
                }
            }
            Next::Nothing => {}
        }
    }

    /// Completes the callers of a prompt that was never shown.
    ///
    /// Nobody answered, so the kind goes back to `Unknown` and a later call
    /// prompts again. An unshown background prompt still leaves foreground.
    fn abandon(&self, kind: PermissionKind, correlation: CorrelationId) {
        let next = {
            let mut state = self.lock();
            let Some(request) = state.pending.remove(&correlation) else {
                return;
            };
            let domain = kind.domain();
            if state.in_flight.get(&domain) == Some(&correlation) {
                state.in_flight.remove(&domain);
            }
            state.states.insert(kind, PermissionState::Unknown);
            let outcome = if kind == PermissionKind::LocationBackground {
                PermissionOutcome::GrantedForegroundOnly
            } else {
                PermissionOutcome::Denied
            };
            Next::Complete(request.waiters, outcome)
        };
        self.run(next);
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
