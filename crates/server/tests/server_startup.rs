//! Server startup integration tests.
//!
//! Spawns the real binary against a temp config and exercises the HTTP
//! surface: health, device lifecycle (including error mapping), tasks,
//! status, and metrics.

use std::io::Write;
use std::net::TcpListener;
use std::time::Duration;

use reqwest::Client;
use tempfile::NamedTempFile;
use tokio::time::sleep;

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Create a minimal valid config.
///
/// Per-device polling loops are disabled so tests control polling.
fn minimal_config(port: u16) -> String {
    format!(
        r#"
[server]
host = "127.0.0.1"
port = {}

[orchestrator]
poll_interval_ms = 0
poll_timeout_ms = 250
"#,
        port
    )
}

/// Spawn the server and return a handle
fn spawn_server(config_path: &std::path::Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_printherd"))
        .env("PRINTHERD_CONFIG", config_path)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

struct TestServer {
    port: u16,
    client: Client,
    _server: tokio::process::Child,
    _config: NamedTempFile,
}

impl TestServer {
    async fn start() -> Self {
        let port = get_available_port();

        let mut config = NamedTempFile::new().unwrap();
        config
            .write_all(minimal_config(port).as_bytes())
            .unwrap();
        config.flush().unwrap();

        let server = spawn_server(config.path());
        assert!(
            wait_for_server(port, 100).await,
            "Server did not start in time"
        );

        Self {
            port,
            client: Client::new(),
            _server: server,
            _config: config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start().await;

    let response = server
        .client
        .get(server.url("/api/v1/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_device_lifecycle_and_error_mapping() {
    let server = TestServer::start().await;

    // No devices yet.
    let body: serde_json::Value = server
        .client
        .get(server.url("/api/v1/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 0);

    // Register a device (unreachable endpoint is fine; nothing polls yet).
    let register = serde_json::json!({
        "id": "voron-01",
        "url": "http://127.0.0.1:1",
    });
    let response = server
        .client
        .post(server.url("/api/v1/devices"))
        .json(&register)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["device_id"], "voron-01");
    assert_eq!(body["state"], "disconnected");

    // Duplicate registration conflicts.
    let response = server
        .client
        .post(server.url("/api/v1/devices"))
        .json(&register)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // Empty id is rejected.
    let response = server
        .client
        .post(server.url("/api/v1/devices"))
        .json(&serde_json::json!({"id": "", "url": "http://x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);

    // Unknown device reads are 404.
    let response = server
        .client
        .get(server.url("/api/v1/devices/ghost"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let response = server
        .client
        .post(server.url("/api/v1/devices/ghost/poll"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Polling the unreachable device reports failure as state, not an error.
    let response = server
        .client
        .post(server.url("/api/v1/devices/voron-01/poll"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["state"], "connecting");
    assert_eq!(body["consecutive_failures"], 1);

    // Deregistration is a silent no-op for unknown ids.
    for id in ["voron-01", "ghost"] {
        let response = server
            .client
            .delete(server.url(&format!("/api/v1/devices/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 204);
    }

    let body: serde_json::Value = server
        .client
        .get(server.url("/api/v1/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_builtin_tasks_are_registered() {
    let server = TestServer::start().await;

    let body: serde_json::Value = server
        .client
        .get(server.url("/api/v1/tasks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ids: Vec<&str> = body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"connect-devices"));
    assert!(ids.contains(&"dashboard-stats"));
    // Polling loops are disabled in the test config, so the batch poll job
    // takes over.
    assert!(ids.contains(&"fleet-poll"));

    // The startup task has run exactly once by the time the server is up.
    let connect = body["tasks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == "connect-devices")
        .unwrap();
    assert_eq!(connect["total_runs"], 1);
    assert_eq!(connect["last_result"], "success");
}

#[tokio::test]
async fn test_status_and_metrics_endpoints() {
    let server = TestServer::start().await;

    let response = server
        .client
        .get(server.url("/api/v1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["devices_total"], 0);
    assert!(body["tasks_total"].as_u64().unwrap() >= 2);

    let response = server
        .client
        .get(server.url("/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let text = response.text().await.unwrap();
    assert!(text.contains("printherd_"));
}
