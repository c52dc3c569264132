use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

/// Actions are posted to the root path.
pub const PATH_ACTION: &str = "/";

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    saw_json_content_type: Arc<AtomicU64>,
    hosts: Arc<Mutex<HashMap<String, u64>>>,
    actions: Arc<Mutex<HashMap<String, u64>>>,
}

impl TestServerStats {
    fn inc_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    fn inc_saw_json_content_type(&self) {
        self.saw_json_content_type.fetch_add(1, Ordering::Relaxed);
    }

    fn record(map: &Mutex<HashMap<String, u64>>, key: &str) {
        let mut guard = map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn saw_json_content_type(&self) -> u64 {
        self.saw_json_content_type.load(Ordering::Relaxed)
    }

    /// Requests seen with the given `Host` header value.
    pub fn saw_host(&self, host: &str) -> u64 {
        self.hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(host)
            .copied()
            .unwrap_or(0)
    }

    /// Requests seen whose body carried `"name": <name>`.
    pub fn action_count(&self, name: &str) -> u64 {
        self.actions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

/// Body understood by the action handler. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
struct ActionRequest {
    #[serde(default)]
    name: Option<String>,
    /// Status code to answer with; 200 when absent.
    #[serde(default)]
    status: Option<u16>,
    /// Artificial latency before answering.
    #[serde(default)]
    sleep_ms: Option<u64>,
}

async fn handle_action(
    State(stats): State<TestServerStats>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Bytes) {
    stats.inc_requests_total();

    if headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().starts_with("application/json"))
    {
        stats.inc_saw_json_content_type();
    }
    if let Some(host) = headers.get("host").and_then(|v| v.to_str().ok()) {
        TestServerStats::record(&stats.hosts, host);
    }

    let req: ActionRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, Bytes::from_static(b"bad json")),
    };

    if let Some(name) = &req.name {
        TestServerStats::record(&stats.actions, name);
    }
    if let Some(ms) = req.sleep_ms {
        sleep(Duration::from_millis(ms)).await;
    }

    let status = req
        .status
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::OK);
    let body = if status == StatusCode::BAD_REQUEST {
        Bytes::from_static(b"rejected by request")
    } else {
        Bytes::from_static(b"{}")
    };

    (status, body)
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_ACTION, post(handle_action))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();

        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
