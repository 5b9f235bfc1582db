//! Loopback fake of the sync daemon's REST interface.
//!
//! An axum router bound to `127.0.0.1:0` serving the canned documents from
//! [`crate::fixtures`]. It enforces the API key header, records every
//! configuration POST and counts restart/shutdown requests. The health
//! endpoint can be made to fail a number of times before it answers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use serde_json::Value;
use syncmate_core::rest::API_KEY_HEADER;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

use crate::fixtures;

/// State shared by the fake daemon's handlers.
pub struct FakeDaemonState {
    api_key: Option<String>,
    unready_probes: AtomicU32,
    config: Mutex<Value>,
    posted_configs: Mutex<Vec<Value>>,
    restarts: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl FakeDaemonState {
    fn authorized(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        let Some(expected) = &self.api_key else {
            return Ok(());
        };
        match headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
            Some(key) if key == expected => Ok(()),
            _ => Err(StatusCode::FORBIDDEN),
        }
    }
}

/// A running fake daemon. Stops serving when dropped.
pub struct FakeDaemon {
    addr: SocketAddr,
    state: Arc<FakeDaemonState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl FakeDaemon {
    /// Start a daemon requiring `api_key` (if any) on every `/rest` call.
    pub async fn start(api_key: Option<&str>) -> Self {
        Self::start_with_unready_probes(api_key, 0).await
    }

    /// Like [`FakeDaemon::start`], but the health endpoint answers 503 for
    /// the first `unready_probes` requests.
    pub async fn start_with_unready_probes(api_key: Option<&str>, unready_probes: u32) -> Self {
        let state = Arc::new(FakeDaemonState {
            api_key: api_key.map(str::to_string),
            unready_probes: AtomicU32::new(unready_probes),
            config: Mutex::new(fixtures::config_document()),
            posted_configs: Mutex::new(Vec::new()),
            restarts: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake daemon");
        let addr = listener.local_addr().expect("fake daemon has no address");
        info!(%addr, "Fake daemon listening");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(Arc::clone(&state));
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The configuration document as the daemon currently holds it.
    pub fn config(&self) -> Value {
        self.state.config.lock().expect("config lock poisoned").clone()
    }

    /// Every configuration document POSTed so far, in order.
    pub fn posted_configs(&self) -> Vec<Value> {
        self.state
            .posted_configs
            .lock()
            .expect("posted configs lock poisoned")
            .clone()
    }

    pub fn restarts(&self) -> usize {
        self.state.restarts.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

/// Build the router with all daemon routes.
pub fn router(state: Arc<FakeDaemonState>) -> axum::Router {
    axum::Router::new()
        .route("/", get(handle_health))
        .route("/rest/version", get(handle_version))
        .route("/rest/config", get(handle_get_config).post(handle_post_config))
        .route("/rest/system", get(handle_system))
        .route("/rest/connections", get(handle_connections))
        .route("/rest/restart", post(handle_restart))
        .route("/rest/shutdown", post(handle_shutdown))
        .with_state(state)
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_health(State(state): State<Arc<FakeDaemonState>>) -> StatusCode {
    let still_starting = state
        .unready_probes
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if still_starting {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn handle_version(
    State(state): State<Arc<FakeDaemonState>>,
    headers: HeaderMap,
) -> Result<&'static str, StatusCode> {
    state.authorized(&headers)?;
    Ok(fixtures::VERSION)
}

async fn handle_get_config(
    State(state): State<Arc<FakeDaemonState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    state.authorized(&headers)?;
    let config = state.config.lock().expect("config lock poisoned").clone();
    Ok(Json(config))
}

async fn handle_post_config(
    State(state): State<Arc<FakeDaemonState>>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, StatusCode> {
    state.authorized(&headers)?;
    let doc: Value = serde_json::from_str(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
    *state.config.lock().expect("config lock poisoned") = doc.clone();
    state
        .posted_configs
        .lock()
        .expect("posted configs lock poisoned")
        .push(doc);
    Ok(StatusCode::OK)
}

async fn handle_system(
    State(state): State<Arc<FakeDaemonState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    state.authorized(&headers)?;
    Ok(Json(fixtures::system_document(fixtures::LOCAL_ID)))
}

async fn handle_connections(
    State(state): State<Arc<FakeDaemonState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    state.authorized(&headers)?;
    Ok(Json(fixtures::connections_document()))
}

async fn handle_restart(
    State(state): State<Arc<FakeDaemonState>>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    state.authorized(&headers)?;
    state.restarts.fetch_add(1, Ordering::SeqCst);
    Ok(StatusCode::OK)
}

async fn handle_shutdown(
    State(state): State<Arc<FakeDaemonState>>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    state.authorized(&headers)?;
    state.shutdowns.fetch_add(1, Ordering::SeqCst);
    Ok(StatusCode::OK)
}
