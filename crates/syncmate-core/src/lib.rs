#![deny(unsafe_code)]

//! syncmate control-plane client.
//!
//! Talks to the sync daemon's HTTP management interface: waits for it to come
//! up, bootstraps version, configuration and local identity, and exposes
//! typed read/modify/commit operations over the cached configuration. All
//! completions are delivered on a single [`Dispatcher`] so view collaborators
//! can mutate their state without further synchronisation.

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Sequential job queue standing in for the UI thread, plus cancellation tokens.
pub mod dispatch;
/// Human-readable byte and bit-rate formatting.
pub mod format;
/// User-visible notifications ("restart required").
pub mod notify;
/// Daemon REST client: executor, readiness prober, bootstrap and config facade.
pub mod rest;
/// Handle to whatever process supervises the daemon.
pub mod supervisor;

pub use dispatch::{CancelToken, DispatchLoop, Dispatcher};
pub use notify::{NOTIFICATION_RESTART, Notification, NotificationCenter, Notifier};
pub use rest::{
    ApiError, ApiKey, ApiRequest, ApiState, ProbeError, ReadinessProber, RequestError,
    RequestExecutor, RestApi, ReqwestExecutor, Section, WebGuiAvailableListener,
};
pub use supervisor::{ServiceSupervisor, SupervisorAction, SupervisorHandle};
