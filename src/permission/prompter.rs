//! Host-side permission prompting.
//!
//! The host owns the actual OS dialogs. The gateway only asks it whether a
//! permission is currently held and to show a prompt; the answer comes back
//! later through [`PermissionGateway::on_os_reply`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::{CorrelationId, PermissionGateway, PermissionKind};
use crate::error::{Error, Result};

/// Bridge to the platform permission APIs.
///
/// Implementations must not call back into the gateway synchronously from
/// [`is_granted`](Self::is_granted) or
/// [`requires_background_grant`](Self::requires_background_grant); both are
/// queried while the gateway holds its lock. [`prompt`](Self::prompt) is
/// called without the lock and may reply immediately.
pub trait PermissionPrompter: Send + Sync {
    /// Whether the OS currently grants `kind`.
    fn is_granted(&self, kind: PermissionKind) -> bool;

    /// Whether background location needs its own grant on this platform.
    fn requires_background_grant(&self) -> bool;

    /// Shows the OS prompt for `kind`. The reply must be delivered to
    /// [`PermissionGateway::on_os_reply`] with the same `correlation`.
    ///
    /// An error means no reply will ever come; the gateway then completes
    /// the waiting callers itself.
    fn prompt(&self, kind: PermissionKind, correlation: CorrelationId) -> Result<()>;
}

/// An outstanding prompt forwarded by [`ChannelPrompter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptRequest {
    /// Permission being asked for.
    pub kind: PermissionKind,
    /// Id the reply must carry.
    pub correlation: CorrelationId,
}

/// A prompter that forwards prompts over a channel and remembers answers.
///
/// Stands in for the OS in the `pushreg` binary and in tests: a task reads
/// [`PromptRequest`]s from the receiver and answers them with
/// [`reply`](Self::reply).
#[derive(Debug, Clone)]
pub struct ChannelPrompter {
    tx: mpsc::UnboundedSender<PromptRequest>,
    granted: Arc<Mutex<HashSet<PermissionKind>>>,
    background_separate: bool,
}

impl ChannelPrompter {
    /// Creates a prompter and the receiver its prompts arrive on.
    ///
    /// `background_separate` selects platforms where background location is
    /// a distinct grant.
    pub fn new(background_separate: bool) -> (Self, mpsc::UnboundedReceiver<PromptRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let prompter = Self {
            tx,
            granted: Arc::new(Mutex::new(HashSet::new())),
            background_separate,
        };
        (prompter, rx)
    }

    /// Records the OS-level grant for `kind` without a prompt.
    ///
    /// Passing `false` simulates the user revoking it in system settings.
    pub fn set_granted(&self, kind: PermissionKind, granted: bool) {
        let mut set = self.granted.lock().unwrap_or_else(|e| e.into_inner());
        if granted {
            set.insert(kind);
        } else {
            set.remove(&kind);
        }
    }

    /// Answers a prompt: records the decision and delivers it to `gateway`.
    ///
    /// Returns whether the gateway still had a caller waiting on it.
    pub fn reply(&self, gateway: &PermissionGateway, request: PromptRequest, granted: bool) -> bool {
        self.set_granted(request.kind, granted);
        gateway.on_os_reply(request.correlation, granted)
    }
}

impl PermissionPrompter for ChannelPrompter {
    fn is_granted(&self, kind: PermissionKind) -> bool {
        self.granted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&kind)
    }

    fn requires_background_grant(&self) -> bool {
        self.background_separate
    }

    fn prompt(&self, kind: PermissionKind, correlation: CorrelationId) -> Result<()> {
        self.tx
            .send(PromptRequest { kind, correlation })
            .map_err(|_closed| {
                Error::NotInitialized(format!("no host listening for {kind:?} prompts"))
            })
    }
}
