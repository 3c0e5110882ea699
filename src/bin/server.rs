use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fog_maze_server::config::ServerSettings;
use fog_maze_server::error::StoreError;
use fog_maze_server::logging::init_tracing;
use fog_maze_server::server_protocol::{parse_put_body, ErrorBody, MazeLoadResponse};
use fog_maze_server::server_utils::{parse_bearer_token, sanitize_user_id};
use fog_maze_server::store::{FileMazeStore, MazeStore};
use serde_json::json;
use tower_http::services::{ServeDir, ServeFile};

#[derive(Clone)]
struct AppState {
    store: Arc<dyn MazeStore>,
}

#[tokio::main]
async fn main() {
    init_tracing("info");
    let settings = ServerSettings::from_env();
    let store: Arc<dyn MazeStore> = Arc::new(FileMazeStore::new(settings.db_path.clone()));

    let app = build_router(AppState { store });
    let app = if let Some(static_dir) = resolve_static_dir(settings.static_dir.as_ref()) {
        let index_file = static_dir.join("index.html");
        tracing::info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        tracing::warn!("static file root not found; serving the api only");
        app
    };

    let bind_addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    tracing::info!(port = settings.port, "listening");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/maze/{uid}", get(load_handler).put(save_handler))
        .with_state(state)
}

fn resolve_static_dir(configured: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.join("index.html").is_file() {
            return Some(path.clone());
        }
    }

    let candidates = [PathBuf::from("dist/client"), PathBuf::from("../dist/client")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn load_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    headers: HeaderMap,
) -> Response {
    let (user_id, token) = match authorize(&uid, &headers) {
        Ok(value) => value,
        Err(response) => return response,
    };

    match state.store.load(&user_id, &token).await {
        Ok(maze_state) => Json(MazeLoadResponse(Some(maze_state))).into_response(),
        Err(StoreError::NotFound) => Json(MazeLoadResponse(None)).into_response(),
        Err(error) => store_error_response(&user_id, error),
    }
}

async fn save_handler(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let (user_id, token) = match authorize(&uid, &headers) {
        Ok(value) => value,
        Err(response) => return response,
    };
    let patch = match parse_put_body(&body) {
        Ok(patch) => patch,
        Err(error) => return error_response(StatusCode::BAD_REQUEST, error.message()),
    };

    let full = patch.is_full();
    match state.store.save(&user_id, &token, patch).await {
        Ok(()) => {
            tracing::debug!(user_id = %user_id, full, "maze state saved");
            Json(json!({ "ok": true })).into_response()
        }
        Err(error) => store_error_response(&user_id, error),
    }
}

fn authorize(uid: &str, headers: &HeaderMap) -> Result<(String, String), Response> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let Some(token) = parse_bearer_token(header_value) else {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "missing bearer token",
        ));
    };
    let Some(user_id) = sanitize_user_id(uid) else {
        return Err(error_response(StatusCode::BAD_REQUEST, "invalid user id"));
    };
    Ok((user_id, token))
}

fn store_error_response(user_id: &str, error: StoreError) -> Response {
    match error {
        StoreError::NotFound => {
            error_response(StatusCode::NOT_FOUND, "no maze state to update")
        }
        StoreError::Unauthorized => error_response(StatusCode::UNAUTHORIZED, error.to_string()),
        StoreError::Transport(_) => {
            tracing::warn!(user_id, %error, "store request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable")
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::HeaderValue;
    use fog_maze_server::config::MazeConfig;
    use fog_maze_server::engine::MazeEngine;
    use fog_maze_server::rng::Rng;
    use fog_maze_server::store::MemoryMazeStore;
    use fog_maze_server::types::{MazeStatePatch, PersistedMazeState, Vec2};

    fn state() -> (AppState, Arc<MemoryMazeStore>) {
        let store = Arc::new(MemoryMazeStore::new());
        (
            AppState {
                store: store.clone(),
            },
            store,
        )
    }

    fn headers(token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).expect("header value");
            headers.insert(header::AUTHORIZATION, value);
        }
        headers
    }

    async fn get(state: &AppState, uid: &str, token: Option<&str>) -> Response {
        load_handler(State(state.clone()), Path(uid.to_string()), headers(token)).await
    }

    async fn put(state: &AppState, uid: &str, token: Option<&str>, body: String) -> Response {
        save_handler(
            State(state.clone()),
            Path(uid.to_string()),
            headers(token),
            body,
        )
        .await
    }

    async fn read_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn sample_state() -> PersistedMazeState {
        MazeEngine::generate(MazeConfig::default(), &mut Rng::new(4)).snapshot()
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (state, _) = state();
        assert_eq!(
            get(&state, "alice", None).await.status(),
            StatusCode::UNAUTHORIZED
        );
        let body = json!({ "mazeState": { "playerPosition": { "x": 1, "y": 1 } } }).to_string();
        assert_eq!(
            put(&state, "alice", None, body).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn get_returns_null_when_nothing_is_stored() {
        let (state, _) = state();
        let response = get(&state, "alice", Some("t")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn full_put_then_get_round_trips() {
        let (state, store) = state();
        let maze_state = sample_state();
        let body = json!({ "mazeState": maze_state }).to_string();
        let response = put(&state, "alice", Some("t"), body).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.stored("alice"), Some(maze_state.clone()));

        let response = get(&state, "alice", Some("t")).await;
        let loaded: PersistedMazeState =
            serde_json::from_value(read_json(response).await).expect("state body");
        assert_eq!(loaded, maze_state);
    }

    #[tokio::test]
    async fn position_put_without_state_is_not_found() {
        let (state, store) = state();
        let body = json!({ "mazeState": { "playerPosition": { "x": 1, "y": 2 } } }).to_string();
        let response = put(&state, "alice", Some("t"), body).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn position_put_patches_existing_state() {
        let (state, store) = state();
        store
            .save("alice", "t", MazeStatePatch::Full(sample_state()))
            .await
            .expect("seed state");
        let body = json!({ "mazeState": { "playerPosition": { "x": 1, "y": 2 } } }).to_string();
        let response = put(&state, "alice", Some("t"), body).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            store.stored("alice").map(|stored| stored.player_position),
            Some(Vec2::new(1, 2))
        );
    }

    #[tokio::test]
    async fn malformed_requests_are_bad_requests() {
        let (state, _) = state();
        let response = put(&state, "alice", Some("t"), "{}".to_string()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = get(&state, "../alice", Some("t")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn offline_store_maps_to_server_error() {
        let (state, store) = state();
        store.set_offline(true);
        let response = get(&state, "alice", Some("t")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
