//! The configuration & query facade over the daemon's REST interface.
//!
//! [`RestApi`] owns the cached configuration document. It is driven by a
//! readiness edge ([`RestApi::on_web_gui_available`]) which starts a
//! [`Bootstrap`]; once all three startup fetches have answered the facade is
//! available and queued listeners are drained in registration order.
//!
//! All read accessors return freshly materialized values and absorb errors
//! into `None` after logging them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use syncmate_config::{AppConfig, DisplayConfig};
use tracing::{debug, info, warn};

use super::ApiError;
use super::bootstrap::{Bootstrap, BootstrapReport};
use super::document;
use super::executor::{ApiKey, ApiRequest, RequestError, RequestExecutor};
use super::probe::WebGuiAvailableListener;
use super::types::{Connections, Node, Repository, Section, SystemInfo};
use crate::format;
use crate::notify::{NOTIFICATION_RESTART, Notification, Notifier};

pub const PATH_VERSION: &str = "/rest/version";
pub const PATH_CONFIG: &str = "/rest/config";
pub const PATH_SYSTEM: &str = "/rest/system";
pub const PATH_CONNECTIONS: &str = "/rest/connections";
pub const PATH_SHUTDOWN: &str = "/rest/shutdown";
pub const PATH_RESTART: &str = "/rest/restart";

type Listener = Box<dyn FnOnce() + Send + 'static>;

/// Externally visible lifecycle of the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiState {
    /// No readiness edge seen yet.
    Idle,
    /// Startup fetches are outstanding.
    Bootstrapping,
    /// Every startup fetch has answered.
    Available,
}

enum Phase {
    Idle,
    Bootstrapping(Bootstrap),
    Available,
}

struct Inner {
    phase: Phase,
    generation: u64,
    version: Option<String>,
    config: Option<Value>,
    local_node_id: Option<String>,
    listeners: VecDeque<Listener>,
    last_report: Option<BootstrapReport>,
}

impl Inner {
    fn document(&self) -> Result<&Value, ApiError> {
        self.config
            .as_ref()
            .ok_or(ApiError::NotAvailable("configuration"))
    }

    fn local_node_id(&self) -> Result<&str, ApiError> {
        self.local_node_id
            .as_deref()
            .ok_or(ApiError::NotAvailable("local node id"))
    }
}

/// Facade over the daemon's configuration and runtime state.
pub struct RestApi {
    url: String,
    api_key: Option<ApiKey>,
    executor: Arc<dyn RequestExecutor>,
    notifier: Arc<dyn Notifier>,
    display: DisplayConfig,
    self_ref: Weak<RestApi>,
    inner: Mutex<Inner>,
}

impl RestApi {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<ApiKey>,
        executor: Arc<dyn RequestExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Self::with_display(url, api_key, executor, notifier, DisplayConfig::default())
    }

    /// Build a facade from the `[daemon]` and `[display]` config sections.
    pub fn from_config(
        config: &AppConfig,
        executor: Arc<dyn RequestExecutor>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Self::with_display(
            config.daemon.url.clone(),
            config.daemon.api_key.as_deref().map(ApiKey::new),
            executor,
            notifier,
            config.display.clone(),
        )
    }

    pub fn with_display(
        url: impl Into<String>,
        api_key: Option<ApiKey>,
        executor: Arc<dyn RequestExecutor>,
        notifier: Arc<dyn Notifier>,
        display: DisplayConfig,
    ) -> Arc<Self> {
        let url = url.into();
        Arc::new_cyclic(|self_ref| Self {
            url,
            api_key,
            executor,
            notifier,
            display,
            self_ref: self_ref.clone(),
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                generation: 0,
                version: None,
                config: None,
                local_node_id: None,
                listeners: VecDeque::new(),
                last_report: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Readiness edge: start (or restart) the three startup fetches.
    ///
    /// Responses belonging to an earlier edge are ignored once a new one
    /// arrives.
    pub fn on_web_gui_available(&self) {
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.phase = Phase::Bootstrapping(Bootstrap::new(inner.generation));
            inner.generation
        };
        info!(generation, url = %self.url, "Web GUI available, bootstrapping REST API");

        self.get_bootstrap(PATH_VERSION, move |api, result| {
            let outcome = result
                .map(|body| body.trim().to_string())
                .map_err(ApiError::from);
            if let Ok(version) = &outcome {
                info!(%version, "Daemon version");
            }
            api.record(generation, |b| b.record_version(outcome));
        });
        self.get_bootstrap(PATH_CONFIG, move |api, result| {
            let outcome = result
                .map_err(ApiError::from)
                .and_then(|body| document::parse_document(&body));
            api.record(generation, |b| b.record_config(outcome));
        });
        self.get_bootstrap(PATH_SYSTEM, move |api, result| {
            let outcome = result
                .map_err(ApiError::from)
                .and_then(|body| document::parse_system_info(&body));
            if let Ok(system) = &outcome {
                info!(local_node_id = %system.my_id, "Local node identity");
            }
            api.record(generation, |b| b.record_system(outcome));
        });
    }

    fn get_bootstrap<F>(&self, path: &'static str, on_response: F)
    where
        F: FnOnce(&RestApi, Result<String, RequestError>) + Send + 'static,
    {
        let weak = self.self_ref.clone();
        self.executor.execute(
            self.request_get(path),
            Box::new(move |result| match weak.upgrade() {
                Some(api) => on_response(&api, result),
                None => debug!(path, "REST API dropped, ignoring bootstrap response"),
            }),
        );
    }

    /// Fill one bootstrap slot; on the last one, become available and drain.
    fn record(&self, generation: u64, fill: impl FnOnce(&mut Bootstrap)) {
        let (listeners, report) = {
            let mut inner = self.lock();
            let complete = match &mut inner.phase {
                Phase::Bootstrapping(bootstrap) if bootstrap.generation() == generation => {
                    fill(bootstrap);
                    bootstrap.is_complete()
                }
                _ => {
                    debug!(generation, "Ignoring response from superseded bootstrap");
                    return;
                }
            };
            if !complete {
                return;
            }

            let Phase::Bootstrapping(bootstrap) =
                std::mem::replace(&mut inner.phase, Phase::Available)
            else {
                return;
            };
            let report = bootstrap.report();
            let results = bootstrap.into_results();
            inner.version = results.version;
            inner.config = results.config;
            inner.local_node_id = results.system.map(|system| system.my_id);
            inner.last_report = Some(report.clone());
            (std::mem::take(&mut inner.listeners), report)
        };

        if report.is_success() {
            info!(generation, listeners = listeners.len(), "REST API available");
        } else {
            warn!(
                generation,
                failed = report.failed.len(),
                listeners = listeners.len(),
                "REST API available with incomplete bootstrap"
            );
        }
        for listener in listeners {
            listener();
        }
    }

    /// Run `listener` once the facade is available.
    ///
    /// Fires synchronously if it already is; otherwise it is queued and
    /// fired after the current (or next) bootstrap completes.
    pub fn register_on_api_available_listener(&self, listener: impl FnOnce() + Send + 'static) {
        let mut inner = self.lock();
        if matches!(inner.phase, Phase::Available) {
            drop(inner);
            listener();
        } else {
            inner.listeners.push_back(Box::new(listener));
        }
    }

    pub fn state(&self) -> ApiState {
        match self.lock().phase {
            Phase::Idle => ApiState::Idle,
            Phase::Bootstrapping(_) => ApiState::Bootstrapping,
            Phase::Available => ApiState::Available,
        }
    }

    /// Outcome of the most recently completed bootstrap.
    pub fn bootstrap_report(&self) -> Option<BootstrapReport> {
        self.lock().last_report.clone()
    }

    // ── Reads ───────────────────────────────────────────────────

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Daemon version string reported during bootstrap.
    pub fn version(&self) -> Option<String> {
        self.lock().version.clone()
    }

    pub fn local_node_id(&self) -> Option<String> {
        self.lock().local_node_id.clone()
    }

    fn read<T>(&self, what: &'static str, f: impl FnOnce(&Inner) -> Result<T, ApiError>) -> Option<T> {
        let inner = self.lock();
        absorb(what, f(&inner))
    }

    /// Peers from the configuration, the local node excluded.
    pub fn nodes(&self) -> Option<Vec<Node>> {
        self.read("nodes", |inner| {
            document::nodes(inner.document()?, inner.local_node_id()?)
        })
    }

    pub fn repositories(&self) -> Option<Vec<Repository>> {
        self.read("repositories", |inner| {
            document::repositories(inner.document()?, inner.local_node_id()?)
        })
    }

    /// Textual projection of `section.key`.
    pub fn get_value(&self, section: Section, key: &str) -> Option<String> {
        self.read("config value", |inner| {
            document::get_value(inner.document()?, section, key)
        })
    }

    // ── Mutations ───────────────────────────────────────────────

    /// Store `value` at `section.key`, push the document to the daemon and
    /// raise the "restart required" notification.
    ///
    /// With `is_array`, `value` must be space-separated text.
    pub fn set_value(
        &self,
        section: Section,
        key: &str,
        value: impl Into<Value>,
        is_array: bool,
    ) -> Result<(), ApiError> {
        let body = {
            let mut inner = self.lock();
            let updated = inner
                .config
                .as_mut()
                .ok_or(ApiError::NotAvailable("configuration"))
                .and_then(|doc| {
                    document::set_value(doc, section, key, value.into(), is_array)?;
                    Ok(doc.to_string())
                });
            updated.inspect_err(|e| warn!(%section, key, error = %e, "Rejected config change"))?
        };
        debug!(%section, key, "Config value changed");
        self.config_updated(body);
        Ok(())
    }

    fn config_updated(&self, body: String) {
        self.post(PATH_CONFIG, body);
        self.notifier.notify(Notification::restart_required());
    }

    /// Ask the daemon to shut down, withdrawing any restart prompt first.
    pub fn shutdown(&self) {
        info!("Requesting daemon shutdown");
        self.notifier.cancel(NOTIFICATION_RESTART);
        self.post(PATH_SHUTDOWN, String::new());
    }

    pub fn restart(&self) {
        info!("Requesting daemon restart");
        self.post(PATH_RESTART, String::new());
    }

    // ── Snapshots ───────────────────────────────────────────────

    /// Fetch a fresh [`SystemInfo`] and hand it to `listener` (`None` on failure).
    pub fn get_system_info(&self, listener: impl FnOnce(Option<SystemInfo>) + Send + 'static) {
        self.executor.execute(
            self.request_get(PATH_SYSTEM),
            Box::new(move |result| {
                let info = result
                    .map_err(ApiError::from)
                    .and_then(|body| document::parse_system_info(&body));
                listener(absorb("system info", info));
            }),
        );
    }

    /// Fetch current [`Connections`] and hand them to `listener` (`None` on failure).
    pub fn get_connections(&self, listener: impl FnOnce(Option<Connections>) + Send + 'static) {
        self.executor.execute(
            self.request_get(PATH_CONNECTIONS),
            Box::new(move |result| {
                let connections = result
                    .map_err(ApiError::from)
                    .and_then(|body| document::parse_connections(&body));
                listener(absorb("connections", connections));
            }),
        );
    }

    // ── Formatting ──────────────────────────────────────────────

    pub fn readable_file_size(&self, bytes: i64) -> String {
        format::readable_file_size(bytes, &self.display.file_size_units)
    }

    pub fn readable_transfer_rate(&self, bytes: i64) -> String {
        format::readable_transfer_rate(bytes, &self.display.transfer_rate_units)
    }

    // ── Requests ────────────────────────────────────────────────

    fn request_get(&self, path: &'static str) -> ApiRequest {
        ApiRequest::get(&self.url, path).with_api_key(self.api_key.clone())
    }

    fn post(&self, path: &'static str, body: String) {
        let request = ApiRequest::post(&self.url, path, body).with_api_key(self.api_key.clone());
        self.executor.execute(
            request,
            Box::new(move |result| match result {
                Ok(_) => debug!(path, "Daemon accepted POST"),
                Err(e) => warn!(path, error = %e, "Daemon POST failed"),
            }),
        );
    }
}

impl WebGuiAvailableListener for RestApi {
    fn on_web_gui_available(&self) {
        RestApi::on_web_gui_available(self);
    }
}

impl std::fmt::Debug for RestApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestApi")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn absorb<T>(what: &'static str, result: Result<T, ApiError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(what, error = %e, "REST API read failed");
            None
        }
    }
}
