//! End-to-end tests against real listeners.

use async_trait::async_trait;
use onebox_core::host::{
    Constructed, HandlerConstructor, ServiceContext, ServiceHandler, StandaloneConstructor,
    TransportHandler,
};
use onebox_core::transport::{Registrations, RpcClient};
use onebox_core::types::{ServiceAddresses, TransportConfig};
use onebox_core::{Error, HostConfig, Onebox, Result, RuntimeState, ServiceConstructors, ServiceKind};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};

const SETTLE: Duration = Duration::from_millis(200);
const TEST_DEADLINE: Duration = Duration::from_secs(20);

/// Helper: reserve three distinct free ports, then release them.
async fn free_addresses() -> ServiceAddresses {
    let mut listeners = Vec::new();
    for _ in 0..3 {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }
    let addrs: Vec<String> = listeners
        .iter()
        .map(|l| l.local_addr().unwrap().to_string())
        .collect();
    ServiceAddresses {
        frontend: addrs[0].clone(),
        history: addrs[1].clone(),
        matching: addrs[2].clone(),
    }
}

fn test_config(services: ServiceAddresses) -> HostConfig {
    let mut config = HostConfig {
        services,
        settle_period: SETTLE,
        shutdown_timeout: Duration::from_secs(5),
        ..HostConfig::default()
    };
    config.readiness.initial_backoff = Duration::from_millis(10);
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Constructed(ServiceKind),
    Serving(ServiceKind),
}

type EventLog = Arc<Mutex<Vec<(Event, Instant)>>>;

/// Constructor that records when each service is built and when it serves.
#[derive(Debug, Clone)]
struct Recording {
    log: EventLog,
    fail: Option<ServiceKind>,
}

impl Recording {
    fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            fail: None,
        }
    }

    fn failing(kind: ServiceKind) -> Self {
        Self {
            fail: Some(kind),
            ..Self::new()
        }
    }

    fn events(&self) -> Vec<(Event, Instant)> {
        self.log.lock().unwrap().clone()
    }

    fn first(&self, wanted: Event) -> Option<Instant> {
        self.events()
            .into_iter()
            .find(|(event, _)| *event == wanted)
            .map(|(_, at)| at)
    }
}

#[derive(Debug)]
struct RecordingHandler {
    inner: TransportHandler,
    kind: ServiceKind,
    log: EventLog,
}

#[async_trait]
impl ServiceHandler for RecordingHandler {
    async fn start(&self, registrations: Registrations) -> Result<()> {
        self.inner.start(registrations).await?;
        self.log
            .lock()
            .unwrap()
            .push((Event::Serving(self.kind), Instant::now()));
        Ok(())
    }

    async fn stop(&self) {
        self.inner.stop().await;
    }
}

#[async_trait]
impl HandlerConstructor for Recording {
    async fn construct(&self, ctx: ServiceContext) -> Result<Constructed> {
        let kind = ctx.kind();
        self.log
            .lock()
            .unwrap()
            .push((Event::Constructed(kind), Instant::now()));
        if self.fail == Some(kind) {
            return Err(Error::validation("shard manager unavailable"));
        }
        // Stagger the first wave so ordering is not an accident of timing.
        if kind == ServiceKind::History {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let handler: Arc<dyn ServiceHandler> = Arc::new(RecordingHandler {
            inner: TransportHandler::new(ctx),
            kind,
            log: self.log.clone(),
        });
        Ok((handler, Vec::new()))
    }
}

fn recording_host(config: HostConfig, recording: &Recording) -> Onebox {
    Onebox::new(config, ServiceConstructors::uniform(Arc::new(recording.clone()))).unwrap()
}

#[tokio::test]
async fn test_start_returns_after_every_endpoint_accepts() {
    let addresses = free_addresses().await;
    let recording = Recording::new();
    let mut onebox = recording_host(test_config(addresses.clone()), &recording);

    let began = Instant::now();
    tokio::time::timeout(TEST_DEADLINE, onebox.start())
        .await
        .unwrap()
        .unwrap();
    assert!(began.elapsed() >= SETTLE, "start returned before the settle period");
    assert_eq!(onebox.state(), RuntimeState::Running);

    for address in [&addresses.frontend, &addresses.matching, &addresses.history] {
        assert!(
            TcpStream::connect(address).await.is_ok(),
            "{address} is not accepting after start"
        );
    }
    assert!(onebox.status().services.iter().all(|s| s.running));

    tokio::time::timeout(TEST_DEADLINE, onebox.stop()).await.unwrap();
    assert_eq!(onebox.state(), RuntimeState::Stopped);
    for address in [&addresses.frontend, &addresses.matching, &addresses.history] {
        assert!(
            TcpStream::connect(address).await.is_err(),
            "{address} still accepting after stop"
        );
    }
    assert!(onebox.status().services.iter().all(|s| !s.running));
}

#[tokio::test]
async fn test_frontend_constructed_after_dependencies_serve() {
    let recording = Recording::new();
    let mut onebox = recording_host(test_config(free_addresses().await), &recording);
    tokio::time::timeout(TEST_DEADLINE, onebox.start())
        .await
        .unwrap()
        .unwrap();

    let frontend_built = recording
        .first(Event::Constructed(ServiceKind::Frontend))
        .unwrap();
    let matching_serving = recording
        .first(Event::Serving(ServiceKind::Matching))
        .unwrap();
    let history_serving = recording
        .first(Event::Serving(ServiceKind::History))
        .unwrap();
    assert!(matching_serving <= frontend_built);
    assert!(history_serving <= frontend_built);

    let order: Vec<ServiceKind> = recording
        .events()
        .into_iter()
        .filter_map(|(event, _)| match event {
            Event::Constructed(kind) => Some(kind),
            Event::Serving(_) => None,
        })
        .collect();
    assert_eq!(order.len(), 3);
    assert_eq!(order[2], ServiceKind::Frontend);

    onebox.stop().await;
}

#[tokio::test]
async fn test_bind_failure_on_history_aborts_start() {
    let addresses = free_addresses().await;
    let squatter = TcpListener::bind(&addresses.history).await.unwrap();
    let recording = Recording::new();
    let mut onebox = recording_host(test_config(addresses.clone()), &recording);

    let err = tokio::time::timeout(TEST_DEADLINE, onebox.start())
        .await
        .expect("start hung on a bind failure")
        .unwrap_err();
    match &err {
        Error::Bind { service, address, .. } => {
            assert_eq!(service, "onebox-history");
            assert_eq!(address, &addresses.history);
        }
        other => panic!("expected bind error, got {other:?}"),
    }
    assert!(err.is_startup_failure());
    assert_eq!(onebox.state(), RuntimeState::Stopped);

    // Frontend never came up and matching gave its port back.
    assert!(recording
        .first(Event::Constructed(ServiceKind::Frontend))
        .is_none());
    assert!(TcpListener::bind(&addresses.matching).await.is_ok());
    drop(squatter);

    // Stop after a failed start is a no-op.
    onebox.stop().await;
    assert_eq!(onebox.state(), RuntimeState::Stopped);
}

#[tokio::test]
async fn test_construction_failure_is_reported_with_service() {
    let addresses = free_addresses().await;
    let recording = Recording::failing(ServiceKind::Matching);
    let mut onebox = recording_host(test_config(addresses.clone()), &recording);

    let err = tokio::time::timeout(TEST_DEADLINE, onebox.start())
        .await
        .unwrap()
        .unwrap_err();
    match err {
        Error::Construction { service, reason } => {
            assert_eq!(service, "onebox-matching");
            assert!(reason.contains("shard manager unavailable"));
        }
        other => panic!("expected construction error, got {other:?}"),
    }
    assert!(TcpListener::bind(&addresses.history).await.is_ok());
}

#[tokio::test]
async fn test_double_stop_is_noop() {
    let recording = Recording::new();
    let mut onebox = recording_host(test_config(free_addresses().await), &recording);
    onebox.start().await.unwrap();

    onebox.stop().await;
    assert_eq!(onebox.state(), RuntimeState::Stopped);
    tokio::time::timeout(Duration::from_secs(1), onebox.stop())
        .await
        .expect("second stop blocked");
    assert_eq!(onebox.state(), RuntimeState::Stopped);
}

#[tokio::test]
async fn test_stop_before_start_is_noop() {
    let recording = Recording::new();
    let mut onebox = recording_host(test_config(free_addresses().await), &recording);
    onebox.stop().await;
    assert_eq!(onebox.state(), RuntimeState::NotStarted);
    assert!(recording.events().is_empty());

    onebox.start().await.unwrap();
    onebox.stop().await;
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let recording = Recording::new();
    let mut onebox = recording_host(test_config(free_addresses().await), &recording);
    onebox.start().await.unwrap();
    let err = onebox.start().await.unwrap_err();
    assert!(matches!(err, Error::StateTransition(_)));
    assert_eq!(onebox.state(), RuntimeState::Running);
    onebox.stop().await;
}

#[tokio::test]
async fn test_address_accessors_are_pure() {
    let onebox = Onebox::new(
        HostConfig::default(),
        ServiceConstructors::uniform(Arc::new(StandaloneConstructor)),
    )
    .unwrap();
    for _ in 0..2 {
        assert_eq!(onebox.frontend_address(), "127.0.0.1:7104");
        assert_eq!(onebox.history_service_address(), "127.0.0.1:7105");
        assert_eq!(onebox.matching_service_address(), "127.0.0.1:7106");
    }
    assert_eq!(onebox.state(), RuntimeState::NotStarted);
    assert_eq!(
        onebox.membership().hosts(),
        vec!["127.0.0.1:7104", "127.0.0.1:7106", "127.0.0.1:7105"]
    );
}

#[tokio::test]
async fn test_standalone_services_reach_their_peers() {
    let addresses = free_addresses().await;
    let mut onebox = Onebox::new(
        test_config(addresses.clone()),
        ServiceConstructors::uniform(Arc::new(StandaloneConstructor)),
    )
    .unwrap();
    onebox.start().await.unwrap();

    let mut client = RpcClient::connect(&addresses.frontend, &TransportConfig::default())
        .await
        .unwrap();
    let described = client
        .call("onebox-frontend", "Describe", serde_json::Value::Null)
        .await
        .unwrap();
    assert_eq!(described["service"], "onebox-frontend");
    assert_eq!(described["num_history_shards"], 4);
    assert_eq!(described["membership"].as_array().unwrap().len(), 3);

    let peers = client
        .call("onebox-frontend", "Peers", serde_json::Value::Null)
        .await
        .unwrap();
    assert_eq!(peers["onebox-matching"], true);
    assert_eq!(peers["onebox-history"], true);

    let err = client
        .call("onebox-frontend", "Nope", serde_json::Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Remote { ref code, .. } if code == "NOT_FOUND"));

    drop(client);
    onebox.stop().await;
}

#[tokio::test]
async fn test_open_connection_is_not_served_after_stop() {
    let addresses = free_addresses().await;
    let mut onebox = Onebox::new(
        test_config(addresses.clone()),
        ServiceConstructors::uniform(Arc::new(StandaloneConstructor)),
    )
    .unwrap();
    onebox.start().await.unwrap();

    let mut clients = Vec::new();
    for address in [&addresses.frontend, &addresses.matching, &addresses.history] {
        let mut client = RpcClient::connect(address, &TransportConfig::default())
            .await
            .unwrap();
        client
            .call("health", "Ping", serde_json::Value::Null)
            .await
            .unwrap();
        clients.push(client);
    }

    tokio::time::timeout(TEST_DEADLINE, onebox.stop()).await.unwrap();

    for client in &mut clients {
        let address = client.address().to_string();
        let served = tokio::time::timeout(
            Duration::from_secs(5),
            client.call("health", "Ping", serde_json::Value::Null),
        )
        .await
        .expect("call on a closed connection hung");
        assert!(served.is_err(), "{address} answered after stop");
    }
}
