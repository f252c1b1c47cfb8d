use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Local;
use futures_util::{SinkExt, StreamExt};
use ghost_squad::config::ServerConfig;
use ghost_squad::content::load_active_content;
use ghost_squad::error::StoreError;
use ghost_squad::rankings::{build_board, RankingError};
use ghost_squad::server_protocol::{
    error_message, parse_client_message, pong_message, snapshot_message, ParsedClientMessage,
};
use ghost_squad::server_utils::{make_id, normalize_db_path, now_ms, parse_ranking_limit};
use ghost_squad::store::{DocumentStore, MemoryStore, Subscription};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const OUTBOUND_QUEUE: usize = 256;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn DocumentStore>,
}

#[derive(Debug, Deserialize)]
struct RankingQuery {
    limit: Option<String>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn bad_path(raw: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": format!("invalid path: {raw}") }),
        }
    }
}

fn store_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        StoreError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        StoreError::Decode { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self {
            status: store_status(&error),
            body: json!({ "error": error.to_string() }),
        }
    }
}

impl From<RankingError> for ApiError {
    fn from(error: RankingError) -> Self {
        let status = match &error {
            RankingError::Permission(_) => StatusCode::FORBIDDEN,
            RankingError::Store(inner) => store_status(inner),
        };
        Self {
            status,
            body: json!({ "error": error.to_string(), "lines": error.remediation() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = MemoryStore::with_file(config.data_path.clone());
    info!(path = %config.data_path.display(), "document store ready");
    let state = AppState {
        store: Arc::new(store),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/rankings", get(rankings_handler))
        .route("/api/content", get(content_handler))
        .route(
            "/db/{*path}",
            get(db_get)
                .put(db_put)
                .patch(db_patch)
                .post(db_push)
                .delete(db_delete),
        )
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = config.static_dir.clone() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found, set STATIC_DIR to serve the web client");
        app
    };
    let app = app.layer(TraceLayer::new_for_http());

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(port = config.port, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn rankings_handler(
    State(state): State<AppState>,
    Query(query): Query<RankingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let board = build_board(
        state.store.as_ref(),
        parse_ranking_limit(query.limit.as_deref()),
    )
    .await?;
    Ok(Json(board))
}

async fn content_handler(State(state): State<AppState>) -> impl IntoResponse {
    let now = Local::now().naive_local();
    Json(load_active_content(state.store.as_ref(), now).await)
}

/// The root itself is never addressable over HTTP.
fn db_path(raw: &str) -> Result<String, ApiError> {
    normalize_db_path(raw)
        .filter(|path| !path.is_empty())
        .ok_or_else(|| ApiError::bad_path(raw))
}

async fn db_get(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let path = db_path(&raw)?;
    let value = state.store.get(&path).await?;
    Ok(Json(value.unwrap_or(Value::Null)))
}

async fn db_put(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let path = db_path(&raw)?;
    state.store.set(&path, value.clone()).await?;
    Ok(Json(value))
}

async fn db_patch(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(fields): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let path = db_path(&raw)?;
    state.store.update(&path, fields.clone()).await?;
    Ok(Json(fields))
}

async fn db_push(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let path = db_path(&raw)?;
    let key = state.store.push(&path, value).await?;
    Ok(Json(json!({ "name": key })))
}

async fn db_delete(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    let path = db_path(&raw)?;
    state.store.remove(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let mut subscriptions: HashMap<String, Subscription> = HashMap::new();
    debug!(client_id = %client_id, "client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        let raw = match message {
            Message::Text(raw) => raw.to_string(),
            Message::Binary(raw) => match String::from_utf8(raw.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    send(&tx, &client_id, error_message("invalid utf8 message"));
                    continue;
                }
            },
            Message::Close(_) => break,
            _ => continue,
        };
        handle_client_message(&state, &client_id, &tx, &mut subscriptions, &raw);
    }

    subscriptions.clear();
    debug!(client_id = %client_id, "client disconnected");
    drop(tx);
    let _ = writer.await;
}

fn handle_client_message(
    state: &AppState,
    client_id: &str,
    tx: &mpsc::Sender<String>,
    subscriptions: &mut HashMap<String, Subscription>,
    raw: &str,
) {
    let Some(message) = parse_client_message(raw) else {
        send(tx, client_id, error_message("invalid message"));
        return;
    };

    match message {
        ParsedClientMessage::Subscribe { path } => {
            if subscriptions.contains_key(&path) {
                return;
            }
            let sink = tx.clone();
            let label = path.clone();
            let owner = client_id.to_string();
            let subscription = state.store.subscribe(
                &path,
                Arc::new(move |value: Value| {
                    send(&sink, &owner, snapshot_message(&label, &value));
                }),
            );
            debug!(client_id, path = %path, "subscribed");
            subscriptions.insert(path, subscription);
        }
        ParsedClientMessage::Unsubscribe { path } => {
            if subscriptions.remove(&path).is_some() {
                debug!(client_id, path = %path, "unsubscribed");
            }
        }
        ParsedClientMessage::Ping { t } => {
            send(tx, client_id, pong_message(t, now_ms()));
        }
    }
}

/// Snapshots are dropped, not queued, when a client falls behind.
fn send(tx: &mpsc::Sender<String>, client_id: &str, message: Value) {
    if tx.try_send(message.to_string()).is_err() {
        warn!(client_id, "outbound queue full or closed, message dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_http_status() {
        let denied: ApiError = StoreError::PermissionDenied("users".to_string()).into();
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        let invalid: ApiError = StoreError::InvalidPath("a.b".to_string()).into();
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn ranking_permission_error_carries_remediation() {
        let error: ApiError = RankingError::Permission("users".to_string()).into();
        assert_eq!(error.status, StatusCode::FORBIDDEN);
        assert_eq!(error.body["lines"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn bad_paths_are_rejected() {
        assert!(db_path("users/u1").is_ok());
        let error = db_path("users/a#b").expect_err("rejected");
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn root_put_is_rejected_and_store_untouched() {
        let store = MemoryStore::new();
        store
            .set("users/u1", json!({ "points": 10 }))
            .await
            .expect("seed");
        let state = AppState {
            store: Arc::new(store.clone()),
        };

        for raw in ["/", "", " / / "] {
            let error = db_put(
                State(state.clone()),
                Path(raw.to_string()),
                Json(json!({ "admins": { "x": { "role": "superadmin" } } })),
            )
            .await
            .expect_err("root write rejected");
            assert_eq!(error.status, StatusCode::BAD_REQUEST);
        }
        let error = db_delete(State(state.clone()), Path("/".to_string()))
            .await
            .expect_err("root delete rejected");
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(store.snapshot(), json!({ "users": { "u1": { "points": 10 } } }));
    }

    #[tokio::test]
    async fn parent_write_over_denied_path_is_forbidden() {
        let store = MemoryStore::new();
        store.deny("admins").expect("deny");
        let state = AppState {
            store: Arc::new(store.clone()),
        };
        let error = db_patch(
            State(state),
            Path("admins".to_string()),
            Json(json!({ "x/role": "superadmin" })),
        )
        .await
        .expect_err("denied");
        assert_eq!(error.status, StatusCode::FORBIDDEN);
        assert_eq!(store.snapshot(), json!({}));
    }

    #[tokio::test]
    async fn subscribe_pushes_snapshots_until_unsubscribed() {
        let store = MemoryStore::new();
        let state = AppState {
            store: Arc::new(store.clone()),
        };
        let (tx, mut rx) = mpsc::channel::<String>(16);
        let mut subscriptions = HashMap::new();

        handle_client_message(
            &state,
            "client_1",
            &tx,
            &mut subscriptions,
            r#"{"type":"subscribe","path":"ghosts"}"#,
        );
        let initial: Value = serde_json::from_str(&rx.recv().await.expect("snapshot"))
            .expect("json");
        assert_eq!(initial["type"], "snapshot");
        assert_eq!(initial["value"], Value::Null);

        store
            .set("ghosts/g1", json!({ "name": "Slimer" }))
            .await
            .expect("set");
        let changed: Value = serde_json::from_str(&rx.recv().await.expect("snapshot"))
            .expect("json");
        assert_eq!(changed["value"]["g1"]["name"], "Slimer");

        handle_client_message(
            &state,
            "client_1",
            &tx,
            &mut subscriptions,
            r#"{"type":"unsubscribe","path":"ghosts"}"#,
        );
        store.remove("ghosts/g1").await.expect("remove");
        assert!(rx.try_recv().is_err());
    }
}
