//! User-visible notifications.
//!
//! The facade posts a single "restart required" notification after every
//! configuration change. Notifications are keyed by a fixed id, so posting
//! again replaces the pending one instead of stacking. [`NotificationCenter`]
//! is the in-process implementation used by the CLI and the tests; a
//! platform shell plugs its own [`Notifier`] in.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::supervisor::{ServiceSupervisor, SupervisorAction};

pub type NotificationId = u32;

/// Id of the "restart required" notification.
pub const NOTIFICATION_RESTART: NotificationId = 2;

/// A notification and the action it carries when activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub text: String,
    /// Alert (sound, vibrate, banner) only when first posted, not on replacement.
    pub alert_once: bool,
    /// Dismiss on activation.
    pub auto_cancel: bool,
    pub action: Option<SupervisorAction>,
}

impl Notification {
    /// The notification posted after a configuration change.
    pub fn restart_required() -> Self {
        Self {
            id: NOTIFICATION_RESTART,
            title: "Restart required".to_string(),
            text: "Activate to restart the sync daemon and apply the new configuration."
                .to_string(),
            alert_once: true,
            auto_cancel: true,
            action: Some(SupervisorAction::Restart),
        }
    }
}

/// Posts and cancels notifications.
pub trait Notifier: Send + Sync {
    /// Post `notification`, replacing any pending one with the same id.
    fn notify(&self, notification: Notification);

    fn cancel(&self, id: NotificationId);
}

#[derive(Debug)]
struct Posted {
    notification: Notification,
    times_posted: u32,
}

/// In-memory [`Notifier`] keyed by notification id.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    pending: Mutex<BTreeMap<NotificationId, Posted>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<NotificationId, Posted>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of every pending notification, ordered by id.
    pub fn pending(&self) -> Vec<Notification> {
        self.lock()
            .values()
            .map(|posted| posted.notification.clone())
            .collect()
    }

    pub fn is_pending(&self, id: NotificationId) -> bool {
        self.lock().contains_key(&id)
    }

    /// How many times the pending notification `id` was posted (0 if none).
    pub fn times_posted(&self, id: NotificationId) -> u32 {
        self.lock().get(&id).map_or(0, |posted| posted.times_posted)
    }

    /// Simulate the user tapping notification `id`.
    ///
    /// Forwards the carried action to `supervisor` and dismisses the
    /// notification if it auto-cancels. Returns `false` if nothing is pending
    /// under `id`.
    pub fn activate(&self, id: NotificationId, supervisor: &dyn ServiceSupervisor) -> bool {
        let notification = {
            let mut pending = self.lock();
            let Some(posted) = pending.get(&id) else {
                return false;
            };
            let notification = posted.notification.clone();
            if notification.auto_cancel {
                pending.remove(&id);
            }
            notification
        };

        info!(id, title = %notification.title, "Notification activated");
        if let Some(action) = notification.action {
            supervisor.request(action);
        }
        true
    }
}

impl Notifier for NotificationCenter {
    fn notify(&self, notification: Notification) {
        let mut pending = self.lock();
        let id = notification.id;
        match pending.get_mut(&id) {
            Some(posted) => {
                if notification.alert_once {
                    debug!(id, "Notification updated silently");
                } else {
                    info!(id, title = %notification.title, "Notification re-alerted");
                }
                posted.notification = notification;
                posted.times_posted += 1;
            }
            None => {
                info!(id, title = %notification.title, "Notification posted");
                pending.insert(
                    id,
                    Posted {
                        notification,
                        times_posted: 1,
                    },
                );
            }
        }
    }

    fn cancel(&self, id: NotificationId) {
        if self.lock().remove(&id).is_some() {
            debug!(id, "Notification cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::SupervisorHandle;

    #[test]
    fn test_same_id_coalesces() {
        let center = NotificationCenter::new();
        center.notify(Notification::restart_required());
        center.notify(Notification::restart_required());

        assert_eq!(center.pending().len(), 1);
        assert_eq!(center.times_posted(NOTIFICATION_RESTART), 2);
    }

    #[test]
    fn test_cancel_removes_pending() {
        let center = NotificationCenter::new();
        center.notify(Notification::restart_required());
        center.cancel(NOTIFICATION_RESTART);
        assert!(!center.is_pending(NOTIFICATION_RESTART));
        assert_eq!(center.times_posted(NOTIFICATION_RESTART), 0);
    }

    #[test]
    fn test_activate_requests_restart_and_auto_cancels() {
        let center = NotificationCenter::new();
        let (supervisor, mut rx) = SupervisorHandle::new();
        center.notify(Notification::restart_required());

        assert!(center.activate(NOTIFICATION_RESTART, &supervisor));
        assert!(!center.is_pending(NOTIFICATION_RESTART));
        assert_eq!(rx.try_recv().ok(), Some(SupervisorAction::Restart));

        assert!(!center.activate(NOTIFICATION_RESTART, &supervisor));
    }

    #[test]
    fn test_activate_keeps_sticky_notification() {
        let center = NotificationCenter::new();
        let (supervisor, _rx) = SupervisorHandle::new();
        let mut sticky = Notification::restart_required();
        sticky.auto_cancel = false;
        center.notify(sticky);

        assert!(center.activate(NOTIFICATION_RESTART, &supervisor));
        assert!(center.is_pending(NOTIFICATION_RESTART));
    }
}
