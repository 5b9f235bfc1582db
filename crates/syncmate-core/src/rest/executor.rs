//! Request executor: runs daemon HTTP calls off the dispatcher and posts
//! each result back onto it.
//!
//! The facade never awaits anything itself: it hands an [`ApiRequest`] and a
//! one-shot [`Completion`] to a [`RequestExecutor`] and carries on. The
//! production implementation, [`ReqwestExecutor`], performs the call on a
//! tokio worker with `reqwest` and delivers the outcome through the
//! [`Dispatcher`]. No retries are attempted.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::build_info;
use crate::dispatch::Dispatcher;

/// Header carrying the daemon API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Errors delivered to a [`Completion`] instead of a response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("request was dropped before it completed")]
    Abandoned,
}

/// Daemon API key. Zeroized on drop, redacted in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    inner: String,
}

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    /// The raw key, for attaching to a request.
    pub fn expose(&self) -> &str {
        &self.inner
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("inner", &"[REDACTED]")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl Drop for ApiKey {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
        })
    }
}

/// A single call against the daemon's management interface.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub base_url: String,
    pub path: String,
    pub api_key: Option<ApiKey>,
    pub body: Option<String>,
}

impl ApiRequest {
    pub fn get(base_url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            base_url: base_url.into(),
            path: path.into(),
            api_key: None,
            body: None,
        }
    }

    pub fn post(
        base_url: impl Into<String>,
        path: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            method: Method::Post,
            base_url: base_url.into(),
            path: path.into(),
            api_key: None,
            body: Some(body.into()),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<ApiKey>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Base URL and path joined with exactly one slash.
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

/// One-shot continuation receiving the response body or the failure.
pub type Completion = Box<dyn FnOnce(Result<String, RequestError>) + Send + 'static>;

/// Dispatches daemon requests asynchronously.
///
/// Implementations must invoke `on_complete` exactly once, on the thread (or
/// dispatcher) the caller expects UI-bound state to be touched from.
pub trait RequestExecutor: Send + Sync {
    fn execute(&self, request: ApiRequest, on_complete: Completion);
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// [`RequestExecutor`] backed by `reqwest` on the current tokio runtime.
pub struct ReqwestExecutor {
    client: Client,
    runtime: Handle,
    dispatcher: Dispatcher,
    in_flight: Arc<InFlight>,
}

impl ReqwestExecutor {
    /// Create an executor that posts completions onto `dispatcher`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(dispatcher: Dispatcher, timeout: Duration) -> Result<Self, RequestError> {
        let runtime = Handle::try_current().map_err(|e| RequestError::Client(e.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(build_info::user_agent())
            .build()
            .map_err(|e| RequestError::Client(e.to_string()))?;

        Ok(Self {
            client,
            runtime,
            dispatcher,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Create an executor using the timeout from the `[client]` config section.
    pub fn from_config(
        dispatcher: Dispatcher,
        config: &syncmate_config::ClientConfig,
    ) -> Result<Self, RequestError> {
        Self::new(
            dispatcher,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Number of requests whose response has not been handed to the dispatcher yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Wait until every outstanding request has been handed to the dispatcher.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl RequestExecutor for ReqwestExecutor {
    fn execute(&self, request: ApiRequest, on_complete: Completion) {
        debug!(method = %request.method, path = %request.path, "Daemon request");

        let client = self.client.clone();
        let dispatcher = self.dispatcher.clone();
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.count.fetch_add(1, Ordering::AcqRel);

        self.runtime.spawn(async move {
            let result = send(&client, request).await;
            if dispatcher.post(move || on_complete(result)).is_err() {
                warn!("Dispatch loop is gone, dropping request completion");
            }
            if in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
                in_flight.idle.notify_waiters();
            }
        });
    }
}

async fn send(client: &Client, request: ApiRequest) -> Result<String, RequestError> {
    let url = request.url();

    let mut builder = match request.method {
        Method::Get => client.get(&url),
        Method::Post => client.post(&url),
    };
    if let Some(key) = &request.api_key {
        builder = builder.header(API_KEY_HEADER, key.expose());
    }
    if let Some(body) = request.body {
        builder = builder
            .header("content-type", "application/json")
            .body(body);
    }

    let resp = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            RequestError::Timeout { url: url.clone() }
        } else {
            RequestError::Transport {
                url: url.clone(),
                message: e.to_string(),
            }
        }
    })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(RequestError::Status {
            url,
            status: status.as_u16(),
        });
    }

    resp.text().await.map_err(|e| RequestError::Body {
        url,
        message: e.to_string(),
    })
}
