//! Single-consumer job queue that plays the role of the UI thread.
//!
//! HTTP work happens on tokio worker tasks; every completion is posted back
//! onto one [`Dispatcher`] and executed in posting order by its
//! [`DispatchLoop`]. Anything only ever touched from dispatched jobs is
//! therefore observed sequentially.
//!
//! [`CancelToken`] lets a collaborator that goes away turn its pending
//! callbacks into no-ops.

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// A unit of work executed on the dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors from posting onto the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch loop has stopped")]
    Closed,
}

/// Cloneable handle used to post jobs onto the dispatch loop.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher and the loop that executes its jobs.
    ///
    /// The loop must be driven (see [`DispatchLoop::run`] and
    /// [`DispatchLoop::run_pending`]) or posted jobs never execute.
    pub fn new() -> (Self, DispatchLoop) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DispatchLoop { rx })
    }

    /// Queue a job behind everything already posted.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> Result<(), DispatchError> {
        self.tx
            .send(Box::new(job))
            .map_err(|_| DispatchError::Closed)
    }

    /// Run `f` on the dispatcher and wait for its result.
    pub async fn call<F, R>(&self, f: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.post(move || {
            let _ = tx.send(f());
        })?;
        rx.await.map_err(|_| DispatchError::Closed)
    }
}

/// Receiving side of a [`Dispatcher`]; executes jobs one at a time.
pub struct DispatchLoop {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl DispatchLoop {
    /// Execute jobs until every [`Dispatcher`] handle has been dropped.
    pub async fn run(mut self) {
        info!("Dispatch loop started");
        while let Some(job) = self.rx.recv().await {
            job();
        }
        info!("Dispatch loop stopped");
    }

    /// Execute every job that is already queued, including jobs posted by
    /// those jobs, and return how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        if ran > 0 {
            debug!(jobs = ran, "Drained dispatch queue");
        }
        ran
    }
}

/// Shared flag that disarms callbacks belonging to a collaborator that is gone.
///
/// Guarded callbacks hold only a weak reference to the flag. They become
/// no-ops once the token is cancelled or once the collaborator drops its
/// last clone of the token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disarm every callback guarded by this token (and its clones).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wrap a no-argument callback so it does nothing once cancelled.
    pub fn guard(&self, f: impl FnOnce() + Send + 'static) -> Box<dyn FnOnce() + Send + 'static> {
        let flag = Arc::downgrade(&self.cancelled);
        Box::new(move || {
            if !armed(&flag) {
                debug!("Skipping callback of cancelled collaborator");
                return;
            }
            f();
        })
    }

    /// Wrap a one-argument callback so it does nothing once cancelled.
    pub fn guard_with<T: 'static>(
        &self,
        f: impl FnOnce(T) + Send + 'static,
    ) -> Box<dyn FnOnce(T) + Send + 'static> {
        let flag = Arc::downgrade(&self.cancelled);
        Box::new(move |value| {
            if !armed(&flag) {
                debug!("Skipping callback of cancelled collaborator");
                return;
            }
            f(value);
        })
    }
}

/// A dropped token counts as cancelled.
fn armed(flag: &Weak<AtomicBool>) -> bool {
    flag.upgrade()
        .is_some_and(|cancelled| !cancelled.load(Ordering::Acquire))
}
