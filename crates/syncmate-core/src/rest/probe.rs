//! Readiness prober for the daemon's web GUI.
//!
//! Polls the health endpoint until it answers with success, then emits a
//! single "web GUI available" edge to every registered listener. A fresh
//! call to [`ReadinessProber::wait_until_available`] (for example after a
//! daemon restart) emits a fresh edge.
//!
//! With a [`Dispatcher`] attached the edge is posted onto it, so listeners
//! run on the dispatch loop alongside every request completion.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;

use super::executor::{ApiKey, ApiRequest, RequestError, RequestExecutor};

/// Receives the readiness edge.
pub trait WebGuiAvailableListener: Send + Sync {
    fn on_web_gui_available(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("daemon did not become reachable after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: u32,
        last_error: RequestError,
    },
}

/// Polls the daemon health endpoint through a [`RequestExecutor`].
pub struct ReadinessProber {
    executor: Arc<dyn RequestExecutor>,
    base_url: String,
    api_key: Option<ApiKey>,
    health_path: String,
    interval: Duration,
    max_attempts: u32,
    dispatcher: Option<Dispatcher>,
    listeners: Mutex<Vec<Arc<dyn WebGuiAvailableListener>>>,
}

impl ReadinessProber {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

    pub fn new(
        executor: Arc<dyn RequestExecutor>,
        base_url: impl Into<String>,
        api_key: Option<ApiKey>,
        health_path: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            base_url: base_url.into(),
            api_key,
            health_path: health_path.into(),
            interval: Self::DEFAULT_INTERVAL,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            dispatcher: None,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Build a prober from the `[daemon]` and `[client]` config sections.
    pub fn from_config(
        executor: Arc<dyn RequestExecutor>,
        config: &syncmate_config::AppConfig,
    ) -> Self {
        Self::new(
            executor,
            config.daemon.url.clone(),
            config.daemon.api_key.as_deref().map(ApiKey::new),
            config.daemon.health_path.clone(),
        )
        .with_interval(Duration::from_millis(config.client.probe_interval_ms))
        .with_max_attempts(config.client.probe_max_attempts)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// At least one attempt is always made.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Deliver the readiness edge on `dispatcher` instead of the caller's task.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn register(&self, listener: Arc<dyn WebGuiAvailableListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Issue one health request and wait for its completion.
    pub async fn probe_once(&self) -> Result<(), RequestError> {
        let (tx, rx) = oneshot::channel();
        let request = ApiRequest::get(&self.base_url, &self.health_path)
            .with_api_key(self.api_key.clone());
        self.executor.execute(
            request,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        rx.await.map_err(|_| RequestError::Abandoned)?.map(|_| ())
    }

    /// Poll until the daemon answers, then fire the readiness edge.
    ///
    /// Returns the number of attempts it took.
    pub async fn wait_until_available(&self) -> Result<u32, ProbeError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.probe_once().await {
                Ok(()) => {
                    info!(attempt, url = %self.base_url, "Daemon web GUI is reachable");
                    self.notify_listeners();
                    return Ok(attempt);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!(attempt, error = %e, "Giving up on daemon readiness");
                    return Err(ProbeError::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Daemon not reachable yet");
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }

    /// Fire the readiness edge on every registered listener.
    pub fn notify_listeners(&self) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let fire = move || {
            for listener in listeners {
                listener.on_web_gui_available();
            }
        };
        match &self.dispatcher {
            Some(dispatcher) => {
                if dispatcher.post(fire).is_err() {
                    warn!("Dispatch loop stopped, dropping readiness edge");
                }
            }
            None => fire(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::executor::Completion;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` requests, then succeeds.
    struct FlakyExecutor {
        failures: u32,
        seen: AtomicU32,
    }

    impl FlakyExecutor {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                seen: AtomicU32::new(0),
            })
        }
    }

    impl RequestExecutor for FlakyExecutor {
        fn execute(&self, request: ApiRequest, on_complete: Completion) {
            let n = self.seen.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                on_complete(Err(RequestError::Transport {
                    url: request.url(),
                    message: "connection refused".to_string(),
                }));
            } else {
                on_complete(Ok("ok".to_string()));
            }
        }
    }

    struct DropsCompletion;

    impl RequestExecutor for DropsCompletion {
        fn execute(&self, _request: ApiRequest, on_complete: Completion) {
            drop(on_complete);
        }
    }

    #[derive(Default)]
    struct CountingListener(AtomicU32);

    impl WebGuiAvailableListener for CountingListener {
        fn on_web_gui_available(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn prober(executor: Arc<dyn RequestExecutor>) -> ReadinessProber {
        ReadinessProber::new(executor, "http://127.0.0.1:8080", None, "/")
            .with_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_fires_edge_once_after_success() {
        let executor = FlakyExecutor::new(2);
        let prober = prober(executor.clone()).with_max_attempts(5);
        let listener = Arc::new(CountingListener::default());
        prober.register(listener.clone());

        assert_eq!(prober.wait_until_available().await, Ok(3));
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
        assert_eq!(executor.seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let prober = prober(FlakyExecutor::new(10)).with_max_attempts(3);
        let listener = Arc::new(CountingListener::default());
        prober.register(listener.clone());

        let err = prober.wait_until_available().await.unwrap_err();
        let ProbeError::Exhausted {
            attempts,
            last_error,
        } = err;
        assert_eq!(attempts, 3);
        assert!(matches!(last_error, RequestError::Transport { .. }));
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_completion_is_abandoned() {
        let prober = prober(Arc::new(DropsCompletion));
        assert_eq!(prober.probe_once().await, Err(RequestError::Abandoned));
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let prober = prober(FlakyExecutor::new(0)).with_max_attempts(0);
        assert_eq!(prober.max_attempts, 1);
    }

    #[tokio::test]
    async fn test_edge_is_posted_onto_dispatcher() {
        let (dispatcher, mut dispatch_loop) = Dispatcher::new();
        let prober = prober(FlakyExecutor::new(0)).with_dispatcher(dispatcher);
        let listener = Arc::new(CountingListener::default());
        prober.register(listener.clone());

        assert_eq!(prober.wait_until_available().await, Ok(1));
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);

        assert_eq!(dispatch_loop.run_pending(), 1);
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_edge_dropped_when_dispatcher_stopped() {
        let (dispatcher, dispatch_loop) = Dispatcher::new();
        drop(dispatch_loop);
        let prober = prober(FlakyExecutor::new(0)).with_dispatcher(dispatcher);
        let listener = Arc::new(CountingListener::default());
        prober.register(listener.clone());

        assert_eq!(prober.wait_until_available().await, Ok(1));
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);
    }
}
