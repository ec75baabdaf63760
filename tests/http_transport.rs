//! End-to-end tests: real listener, real client.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use common::wait_for_state;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde_json::{json, Value};
use service_envelope::config::ListenerConfig;
use service_envelope::http::{handlers, HttpTransport, Version};
use service_envelope::lifecycle::{LifecycleError, LifecycleState, TransportError};
use service_envelope::LifecycleManager;
use tokio::task::JoinHandle;

struct Running {
    manager: Arc<LifecycleManager<HttpTransport>>,
    run: JoinHandle<Result<(), LifecycleError>>,
    addr: SocketAddr,
    client: reqwest::Client,
}

impl Running {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.manager.shutdown_handle().trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), self.run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(self.manager.state(), LifecycleState::Stopped);
    }
}

fn listener(bind_address: &str) -> ListenerConfig {
    ListenerConfig {
        bind_address: bind_address.into(),
        max_body_bytes: 1024,
        ..ListenerConfig::default()
    }
}

async fn start(routes: Router) -> Running {
    let transport = Arc::new(HttpTransport::new(
        listener("127.0.0.1:0"),
        routes,
        Version::new("v1", "1.2.3"),
    ));
    let manager = common::manager(transport.clone(), Duration::from_secs(2));
    let run = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run().await }
    });
    wait_for_state(&manager, LifecycleState::Running).await;

    let addr = transport.local_addr().unwrap();
    let client = reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap();
    Running {
        manager,
        run,
        addr,
        client,
    }
}

#[tokio::test]
async fn health_is_enveloped() {
    let server = start(handlers::routes()).await;

    let response = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["version"], json!({"label": "v1", "number": "1.2.3"}));
    assert_eq!(body["meta"], json!({"code": "OK"}));
    assert_eq!(body["data"]["status"], "operational");

    server.stop().await;
}

#[tokio::test]
async fn request_id_is_propagated() {
    let server = start(handlers::routes()).await;

    let response = server
        .client
        .get(server.url("/health"))
        .header("x-request-id", "trace-me")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-me");

    server.stop().await;
}

#[tokio::test]
async fn unknown_route_is_a_404_envelope() {
    let server = start(handlers::routes()).await;

    let response = server.client.get(server.url("/missing")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["meta"]["code"], "NOT_FOUND");
    assert_eq!(body["meta"]["error_type"], "Not Found");

    server.stop().await;
}

#[tokio::test]
async fn echo_binds_json_and_rejects_bad_bodies() {
    let server = start(handlers::routes()).await;

    let body: Value = server
        .client
        .post(server.url("/echo"))
        .json(&json!({"message": "<b>hi</b>"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["message"], "<b>hi</b>");
    assert_eq!(body["data"]["tags"], json!([]));

    let response = server
        .client
        .post(server.url("/echo"))
        .header("content-type", "text/plain")
        .body("hi")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = server
        .client
        .post(server.url("/echo"))
        .json(&json!({"message": "x".repeat(4096)}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["meta"]["code"], "PAYLOAD_TOO_LARGE");

    server.stop().await;
}

#[tokio::test]
async fn envelope_strings_are_html_escaped_on_the_wire() {
    let server = start(handlers::routes()).await;

    let raw = server
        .client
        .post(server.url("/echo"))
        .json(&json!({"message": "<script>"}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(raw.contains(r"\u003cscript\u003e"), "{raw}");
    assert!(!raw.contains("<script>"), "{raw}");

    server.stop().await;
}

#[tokio::test]
async fn root_redirect_is_uncacheable() {
    let server = start(handlers::routes()).await;

    let response = server.client.get(server.url("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()["location"], "/health");
    assert_eq!(response.headers()["pragma"], "no-cache");

    server.stop().await;
}

#[tokio::test]
async fn handler_panic_is_recovered() {
    async fn explode() -> &'static str {
        panic!("handler bug")
    }
    let server = start(Router::new().route("/explode", get(explode))).await;

    let response = server.client.get(server.url("/explode")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["meta"]["code"], "INTERNAL_SERVER_ERROR");

    // The listener survives the panic.
    let response = server.client.get(server.url("/explode")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    server.stop().await;
}

#[tokio::test]
async fn stopped_transport_refuses_connections() {
    let server = start(handlers::routes()).await;
    let url = server.url("/health");
    server.stop().await;

    let fresh = reqwest::Client::new();
    assert!(fresh.get(url).send().await.is_err());
}

#[tokio::test]
async fn occupied_address_fails_to_bind() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = occupied.local_addr().unwrap().to_string();

    let transport = Arc::new(HttpTransport::new(
        listener(&address),
        handlers::routes(),
        Version::default(),
    ));
    let manager = common::manager(transport, Duration::from_secs(1));

    let result = manager.run().await;
    assert!(matches!(
        result,
        Err(LifecycleError::Transport(TransportError::Bind { .. }))
    ));
    assert_eq!(
        manager.history(),
        vec![LifecycleState::Idle, LifecycleState::Starting, LifecycleState::Stopped]
    );
}
