//! HTTP surface tests against a live server on an ephemeral port

use std::net::SocketAddr;
use std::sync::Arc;

use multiscreen_relay::api::create_router;
use multiscreen_relay::bus::events::SHOW_CODE;
use multiscreen_relay::bus::{DeliveryEvent, MemoryBus};
use multiscreen_relay::codes::unix_now;
use multiscreen_relay::config::Config;
use multiscreen_relay::storage::models::AccessCode;
use multiscreen_relay::storage::MemoryCodeStore;
use multiscreen_relay::AppState;

struct TestServer {
    addr: SocketAddr,
    bus: Arc<MemoryBus>,
    state: Arc<AppState>,
}

impl TestServer {
    async fn start() -> Self {
        let bus = Arc::new(MemoryBus::new());
        let state = Arc::new(AppState::new(
            Config::default(),
            Arc::new(MemoryCodeStore::new()),
            bus.clone(),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(Arc::clone(&state));
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });

        Self { addr, bus, state }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let response = client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"data": {"status": "ok"}, "status": "success"})
    );
}

#[tokio::test]
async fn test_code_reveal_without_active_code() {
    let server = TestServer::start().await;

    let response = client().get(server.url("/code/")).send().await.unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "fail");
    assert_eq!(body["data"]["message"], "No active access code");
}

#[tokio::test]
async fn test_code_reveal_republishes_active_code() {
    let server = TestServer::start().await;
    let mut events = server.bus.subscribe();
    let code = AccessCode::new("REVEALME00000001".to_string(), unix_now(), 300);
    server.state.store.create(&code).await.unwrap();
    server
        .state
        .store
        .mark_used(&code.code, unix_now())
        .await
        .unwrap();

    let response = client().post(server.url("/code/")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");

    let event = DeliveryEvent::decode(&events.recv().await.unwrap()).unwrap();
    assert_eq!(event.kind, SHOW_CODE);
    let revealed: AccessCode = serde_json::from_value(event.data.unwrap()).unwrap();
    assert_eq!(revealed.code, code.code);
    assert!(revealed.is_unused());
    assert!(server.state.store.get(&code.code).await.unwrap().is_unused());

    // the path without a trailing slash is served too
    let response = client().get(server.url("/code")).send().await.unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_plain_request_to_ws_is_rejected() {
    let server = TestServer::start().await;

    for path in ["/ws/", "/ws"] {
        let response = client().get(server.url(path)).send().await.unwrap();
        assert_eq!(response.status(), 400, "path {path}");
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "fail");
        assert_eq!(body["data"]["message"], "Unable to upgrade to websockets");
    }
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let server = TestServer::start().await;

    let response = client().get(server.url("/codes/current")).send().await.unwrap();
    assert_eq!(response.status(), 404);
}
