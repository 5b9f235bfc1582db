//! End-to-end tests against the loopback fake daemon.
//!
//! These exercise the real `reqwest` executor, the dispatcher and the
//! readiness prober together.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use syncmate_core::rest::{ProbeError, RequestError};
use syncmate_core::{
    ApiKey, ApiState, DispatchLoop, Dispatcher, NOTIFICATION_RESTART, NotificationCenter,
    ReadinessProber, ReqwestExecutor, RestApi, Section,
};
use syncmate_test_utils::config::TestConfigBuilder;
use syncmate_test_utils::fake_daemon::FakeDaemon;
use syncmate_test_utils::fixtures::{self, LOCAL_ID, PEER_ID};
use syncmate_test_utils::tracing_setup::init_test_tracing;
use tokio::sync::oneshot;

const KEY: &str = "test-key";

struct Client {
    dispatcher: Dispatcher,
    executor: Arc<ReqwestExecutor>,
    notifier: Arc<NotificationCenter>,
    api: Arc<RestApi>,
    prober: ReadinessProber,
}

fn spawn_dispatch_loop(dispatch_loop: DispatchLoop) {
    tokio::spawn(dispatch_loop.run());
}

fn client(daemon: &FakeDaemon, api_key: &str) -> Client {
    let config = TestConfigBuilder::new()
        .daemon_url(&daemon.url())
        .api_key(api_key)
        .request_timeout_secs(5)
        .probe_interval_ms(10)
        .probe_max_attempts(20)
        .build();

    let (dispatcher, dispatch_loop) = Dispatcher::new();
    spawn_dispatch_loop(dispatch_loop);
    let executor = Arc::new(
        ReqwestExecutor::from_config(dispatcher.clone(), &config.client).unwrap(),
    );
    let notifier = Arc::new(NotificationCenter::new());
    let api = RestApi::from_config(&config, executor.clone(), notifier.clone());
    let prober =
        ReadinessProber::from_config(executor.clone(), &config).with_dispatcher(dispatcher.clone());
    prober.register(api.clone());

    Client {
        dispatcher,
        executor,
        notifier,
        api,
        prober,
    }
}

impl Client {
    /// Probe, bootstrap and wait for the API-available drain.
    async fn connect(&self) {
        let (tx, rx) = oneshot::channel();
        self.api.register_on_api_available_listener(move || {
            let _ = tx.send(());
        });
        self.prober.wait_until_available().await.unwrap();
        rx.await.unwrap();
    }
}

#[tokio::test]
async fn test_bootstrap_against_daemon() {
    init_test_tracing();
    let daemon = FakeDaemon::start(Some(KEY)).await;
    let c = client(&daemon, KEY);

    c.connect().await;
    assert_eq!(c.api.state(), ApiState::Available);
    assert_eq!(c.api.version().as_deref(), Some(fixtures::VERSION));
    assert_eq!(c.api.local_node_id().as_deref(), Some(LOCAL_ID));
    assert!(c.api.bootstrap_report().unwrap().is_success());

    let nodes = c.api.nodes().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].node_id, PEER_ID);
}

#[tokio::test]
async fn test_prober_waits_for_health() {
    init_test_tracing();
    let daemon = FakeDaemon::start_with_unready_probes(Some(KEY), 3).await;
    let c = client(&daemon, KEY);

    let attempts = c.prober.wait_until_available().await.unwrap();
    assert_eq!(attempts, 4);
}

#[tokio::test]
async fn test_prober_gives_up() {
    init_test_tracing();
    let daemon = FakeDaemon::start_with_unready_probes(None, u32::MAX).await;
    let c = client(&daemon, KEY);
    let prober = ReadinessProber::new(c.executor.clone(), daemon.url(), None, "/")
        .with_interval(Duration::from_millis(1))
        .with_max_attempts(2);

    let err = prober.wait_until_available().await.unwrap_err();
    let ProbeError::Exhausted {
        attempts,
        last_error,
    } = err;
    assert_eq!(attempts, 2);
    assert!(matches!(last_error, RequestError::Status { status: 503, .. }));
}

#[tokio::test]
async fn test_prober_uses_configured_health_path() {
    init_test_tracing();
    let daemon = FakeDaemon::start(Some(KEY)).await;
    let c = client(&daemon, KEY);

    let probe_with = |key: &str| {
        let config = TestConfigBuilder::new()
            .daemon_url(&daemon.url())
            .api_key(key)
            .health_path("/rest/system")
            .probe_interval_ms(1)
            .probe_max_attempts(1)
            .build();
        ReadinessProber::from_config(c.executor.clone(), &config)
    };

    assert_eq!(probe_with(KEY).wait_until_available().await, Ok(1));

    let err = probe_with("wrong-key").wait_until_available().await.unwrap_err();
    let ProbeError::Exhausted { last_error, .. } = err;
    assert!(matches!(last_error, RequestError::Status { status: 403, .. }));
}

#[tokio::test]
async fn test_wrong_api_key_leaves_data_absent() {
    init_test_tracing();
    let daemon = FakeDaemon::start(Some(KEY)).await;
    let c = client(&daemon, "wrong-key");

    c.connect().await;
    assert_eq!(c.api.state(), ApiState::Available);
    assert_eq!(c.api.nodes(), None);

    let report = c.api.bootstrap_report().unwrap();
    assert_eq!(report.failed.len(), 3);
    assert!(report.failed.iter().all(|(_, reason)| reason.contains("403")));
}

#[tokio::test]
async fn test_set_value_reaches_daemon() {
    init_test_tracing();
    let daemon = FakeDaemon::start(Some(KEY)).await;
    let c = client(&daemon, KEY);
    c.connect().await;

    let api = Arc::clone(&c.api);
    c.dispatcher
        .call(move || api.set_value(Section::Options, "ListenAddress", "0.0.0.0:22000 :22001", true))
        .await
        .unwrap()
        .unwrap();
    c.executor.wait_idle().await;

    let posted = daemon.posted_configs();
    assert_eq!(posted.len(), 1);
    assert_eq!(
        posted[0]["Options"]["ListenAddress"],
        json!(["0.0.0.0:22000", ":22001"])
    );
    assert_eq!(posted[0]["Version"], json!(3));
    assert_eq!(daemon.config(), posted[0]);
    assert!(c.notifier.is_pending(NOTIFICATION_RESTART));
}

#[tokio::test]
async fn test_connections_snapshot_from_daemon() {
    init_test_tracing();
    let daemon = FakeDaemon::start(Some(KEY)).await;
    let c = client(&daemon, KEY);

    let (tx, rx) = oneshot::channel();
    c.api.get_connections(move |connections| {
        let _ = tx.send(connections);
    });
    let connections = rx.await.unwrap().unwrap();
    assert_eq!(connections["total"].out_bytes_total, 1024);
    assert_eq!(connections[PEER_ID].client_version, "v0.8.10");
}

#[tokio::test]
async fn test_restart_and_shutdown_are_delivered() {
    init_test_tracing();
    let daemon = FakeDaemon::start(Some(KEY)).await;
    let c = client(&daemon, KEY);

    c.api.restart();
    c.api.shutdown();
    c.executor.wait_idle().await;

    assert_eq!(daemon.restarts(), 1);
    assert_eq!(daemon.shutdowns(), 1);
}

#[tokio::test]
async fn test_unreachable_daemon_is_transport_error() {
    init_test_tracing();
    let (dispatcher, dispatch_loop) = Dispatcher::new();
    spawn_dispatch_loop(dispatch_loop);
    let executor =
        Arc::new(ReqwestExecutor::new(dispatcher, Duration::from_secs(2)).unwrap());
    let prober = ReadinessProber::new(executor, "http://127.0.0.1:9", Some(ApiKey::new(KEY)), "/")
        .with_interval(Duration::from_millis(1))
        .with_max_attempts(1);

    let err = prober.probe_once().await.unwrap_err();
    assert!(matches!(
        err,
        RequestError::Transport { .. } | RequestError::Timeout { .. }
    ));
}
