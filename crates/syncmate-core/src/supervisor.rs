//! Handle to the process that supervises the sync daemon.
//!
//! The control-plane client never owns the daemon; it asks whoever does
//! (a foreground service, a CLI main loop) to act on its behalf. The
//! supervisor is injected wherever it is needed, never reached through
//! global state.

use tokio::sync::mpsc;
use tracing::warn;

/// Requests the client can make of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Restart the daemon so configuration changes take effect.
    Restart,
    /// Stop the daemon.
    Stop,
}

/// Receives [`SupervisorAction`]s.
pub trait ServiceSupervisor: Send + Sync {
    fn request(&self, action: SupervisorAction);
}

/// [`ServiceSupervisor`] that forwards actions over a channel to the task
/// actually owning the daemon.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    action_tx: mpsc::UnboundedSender<SupervisorAction>,
}

impl SupervisorHandle {
    /// Create a handle and the receiver the supervising task listens on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SupervisorAction>) {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        (Self { action_tx }, action_rx)
    }
}

impl ServiceSupervisor for SupervisorHandle {
    fn request(&self, action: SupervisorAction) {
        if self.action_tx.send(action).is_err() {
            warn!(?action, "Supervisor is gone, dropping action");
        }
    }
}
