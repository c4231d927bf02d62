use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::error::AppError;
use crate::poller::PollerStats;
use crate::status::{StatusMonitor, StreamStatus};
use crate::store::EntryStore;

/// Header accepted by older wheel UIs
const CLEAR_PASSWORD_HEADER: &str = "x-clear-password";

/// The secret that guards clearing the wheel
#[derive(Clone)]
pub struct ClearToken {
    token: String,
}

impl ClearToken {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }

    /// Exact, case-sensitive match
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(candidate, &self.token)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntryStore>,
    pub clear_token: ClearToken,
    pub status: Arc<StatusMonitor>,
    pub stats: Arc<RwLock<PollerStats>>,
}

// ── Request / response types ───────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct EntriesResponse {
    entries: Vec<String>,
}

#[derive(Deserialize, Default)]
struct ClearRequest {
    #[serde(alias = "password")]
    token: Option<String>,
}

#[derive(Deserialize)]
struct ClearQuery {
    password: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: StreamStatus,
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    backend: &'static str,
    entries: Option<usize>,
    stream: StreamStatus,
    stream_checked_at: Option<DateTime<Utc>>,
    poller: PollerStats,
}

// ── Handlers ───────────────────────────────────────────────────────────────────

async fn get_entries(State(state): State<AppState>) -> Result<Json<EntriesResponse>, AppError> {
    let entries = state.store.load().await.map_err(AppError::Storage)?;
    Ok(Json(EntriesResponse { entries }))
}

/// Pull the caller's credential from, in order: bearer header, password
/// header, JSON body, `?password=` query.
fn presented_credential(headers: &HeaderMap, query: ClearQuery, body: &[u8]) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if let Some(bearer) = header_value(header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer ").map(|t| t.trim().to_string()))
    {
        return Some(bearer);
    }
    if let Some(password) = header_value(CLEAR_PASSWORD_HEADER) {
        return Some(password);
    }
    if !body.is_empty() {
        if let Some(token) = serde_json::from_slice::<ClearRequest>(body)
            .ok()
            .and_then(|r| r.token)
        {
            return Some(token);
        }
    }
    query.password
}

async fn clear_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ClearQuery>,
    body: Bytes,
) -> Result<Json<EntriesResponse>, AppError> {
    let authorized = presented_credential(&headers, query, &body)
        .is_some_and(|credential| state.clear_token.matches(&credential));
    if !authorized {
        debug!("Rejected clear request with bad credential");
        return Err(AppError::Forbidden);
    }

    state.store.clear().await.map_err(AppError::Storage)?;
    info!("Wheel cleared");
    Ok(Json(EntriesResponse {
        entries: Vec::new(),
    }))
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.status.current().await,
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let entries = state.store.load().await.ok().map(|e| e.len());
    let poller = state.stats.read().await.clone();
    Json(HealthResponse {
        ok: entries.is_some(),
        backend: state.store.backend(),
        entries,
        stream: state.status.current().await,
        stream_checked_at: state.status.checked_at().await,
        poller,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/entries", get(get_entries).delete(clear_entries))
        .route("/entries/clear", post(clear_entries))
        .route("/status", get(get_status))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve the API until `shutdown` flips to true
pub async fn serve(state: AppState, bind: &str, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;
    info!("Wheel API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("Server error")?;

    info!("Wheel API stopped");
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::http::StatusCode;

    async fn spawn_app(store: Arc<dyn EntryStore>) -> (String, reqwest::Client) {
        let state = AppState {
            store,
            clear_token: ClearToken::new("2FD1F4AC3897"),
            status: Arc::new(StatusMonitor::disabled()),
            stats: Arc::new(RwLock::new(PollerStats::default())),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        (format!("http://{addr}"), client)
    }

    async fn seeded_store() -> Arc<dyn EntryStore> {
        let store = MemoryStore::new();
        store.append("Bob", 2).await.unwrap();
        store.append("Amy", 1).await.unwrap();
        Arc::new(store)
    }

    #[test]
    fn test_clear_token_is_exact_and_case_sensitive() {
        let token = ClearToken::new("Secret");
        assert!(token.matches("Secret"));
        assert!(!token.matches("secret"));
        assert!(!token.matches("Secret "));
        assert!(!token.matches(""));
    }

    #[tokio::test]
    async fn test_get_entries_empty() {
        let (base, client) = spawn_app(Arc::new(MemoryStore::new())).await;
        let resp = client.get(format!("{base}/entries")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body, serde_json::json!({ "entries": [] }));
    }

    #[tokio::test]
    async fn test_clear_with_wrong_token_is_rejected() {
        let store = seeded_store().await;
        let (base, client) = spawn_app(store.clone()).await;

        let resp = client
            .post(format!("{base}/entries/clear"))
            .json(&serde_json::json!({ "token": "2fd1f4ac3897" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());

        let resp = client
            .post(format!("{base}/entries/clear"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        assert_eq!(store.load().await.unwrap(), vec!["Bob", "Bob", "Amy"]);
    }

    #[tokio::test]
    async fn test_clear_with_correct_token_empties_entries() {
        let store = seeded_store().await;
        let (base, client) = spawn_app(store.clone()).await;

        let resp = client
            .post(format!("{base}/entries/clear"))
            .json(&serde_json::json!({ "password": "2FD1F4AC3897" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: EntriesResponse = resp.json().await.unwrap();
        assert!(body.entries.is_empty());
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_accepts_bearer_and_password_header() {
        let store = seeded_store().await;
        let (base, client) = spawn_app(store.clone()).await;

        let resp = client
            .post(format!("{base}/entries/clear"))
            .bearer_auth("2FD1F4AC3897")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        store.append("Cat", 1).await.unwrap();
        let resp = client
            .delete(format!("{base}/entries"))
            .header(CLEAR_PASSWORD_HEADER, "2FD1F4AC3897")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_defaults_to_offline() {
        let (base, client) = spawn_app(Arc::new(MemoryStore::new())).await;
        let body: serde_json::Value = client
            .get(format!("{base}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, serde_json::json!({ "status": "offline" }));
    }

    #[tokio::test]
    async fn test_health_reports_backend_and_count() {
        let (base, client) = spawn_app(seeded_store().await).await;
        let body: serde_json::Value = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
        assert_eq!(body["backend"], "memory");
        assert_eq!(body["entries"], 3);
        assert_eq!(body["poller"]["cycles"], 0);
    }
}
