/**
 * Router Configuration
 *
 * # Routes
 *
 * - `GET /chat/` - WebSocket upgrade. The token comes from `?token=` or an
 *   `Authorization: Bearer` header; an unresolvable identity is refused with
 *   403 before any upgrade happens.
 * - `GET /health` - liveness and the number of users with live sockets
 * - `GET <MEDIA_URL>*` - stored media files
 */

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::services::ServeDir;

use crate::backend::auth::token_from_request;
use crate::backend::server::config::ServerConfig;
use crate::backend::server::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ChatQuery {
    pub token: Option<String>,
}

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState, config: &ServerConfig) -> Router<()> {
    let router = Router::new()
        .route("/chat/", get(chat_socket))
        .route("/chat", get(chat_socket))
        .route("/health", get(health));

    let media = ServeDir::new(&config.media_root);
    let media_path = format!("/{}", config.media_url.trim_matches('/'));
    let router = if media_path == "/" {
        router.fallback_service(media)
    } else {
        router.nest_service(&media_path, media)
    };

    router.with_state(app_state)
}

/// Resolve the caller, then hand the upgraded socket to the gateway
async fn chat_socket(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let token = token_from_request(query.token.as_deref(), &headers);
    let identity = match state.resolver.resolve(token).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!("[Server] Refusing socket: {}", e);
            return e.into_response();
        }
    };

    match ws {
        Ok(ws) => {
            let gateway = state.gateway.clone();
            ws.on_upgrade(move |socket| async move {
                gateway.serve(identity, socket).await;
            })
        }
        Err(rejection) => rejection.into_response(),
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "users": state.registry.group_count(),
    }))
}
