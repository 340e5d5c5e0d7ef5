//! Read-only REST API over the catalog.

use crate::handlers::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const USERS_SERVICE: &str = "users-api";
const MESSAGES_SERVICE: &str = "messages-api";
const DEFAULT_RECENT_LIMIT: usize = 10;

/// Routes under `/api`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api", get(index))
        .route("/api/users", get(list_users))
        .route("/api/users/:id", get(get_user))
        .route("/api/messages", get(list_messages))
        .route("/api/messages/recent", get(recent_messages))
}

async fn index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Parley chat relay",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "online",
        "activeUsers": state.hub.roster().len(),
        "_links": {
            "self": { "href": "/api", "method": "GET" },
            "users": { "href": "/api/users", "method": "GET" },
            "userById": { "href": "/api/users/{id}", "method": "GET", "templated": true },
            "messages": { "href": "/api/messages", "method": "GET" },
            "recentMessages": { "href": "/api/messages/recent", "method": "GET" },
            "websocket": {
                "href": state.config.transport.websocket_path,
                "protocol": "websocket"
            }
        }
    }))
}

async fn list_users(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let users = state.catalog.users.list();
    Json(json!({
        "service": USERS_SERVICE,
        "count": users.len(),
        "data": users,
    }))
}

async fn get_user(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match id.parse::<u64>().ok().and_then(|id| state.catalog.users.get(id)) {
        Some(user) => Json(json!({
            "service": USERS_SERVICE,
            "data": user,
            "found": true,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "User not found",
                "service": USERS_SERVICE,
            })),
        )
            .into_response(),
    }
}

async fn list_messages(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let messages = state.catalog.messages.all();
    Json(json!({
        "service": MESSAGES_SERVICE,
        "count": messages.len(),
        "data": messages,
    }))
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<String>,
}

async fn recent_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Json<serde_json::Value> {
    let limit = parse_limit(query.limit.as_deref());
    let messages = state.catalog.messages.recent(limit);
    Json(json!({
        "service": MESSAGES_SERVICE,
        "count": messages.len(),
        "data": messages,
    }))
}

/// Missing, unparsable or zero limits fall back to the default.
fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_RECENT_LIMIT)
}
