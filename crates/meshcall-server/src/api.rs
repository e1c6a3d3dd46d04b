//! REST API for group calls.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::Method,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use meshcall_shared::api::{
    CallResponse, CallsResponse, CreateCallRequest, ListCallsQuery, MembershipRequest,
    ParticipantsResponse, SuccessResponse,
};
use meshcall_shared::{CallDirectory, CallId, ChatId, ParticipantId, Profile};
use meshcall_store::SqliteDirectory;

use crate::error::ServerError;
use crate::relay::RelayStats;

#[derive(Clone)]
pub struct AppState {
    pub directory: SqliteDirectory,
    pub relay_stats: Arc<RelayStats>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/group-calls", post(create_call).get(list_calls))
        .route("/api/group-calls/:call_id/join", post(join_call))
        .route("/api/group-calls/:call_id/leave", post(leave_call))
        .route("/api/group-calls/:call_id/participants", get(list_participants))
        .route("/api/chats/:chat_id/participants", post(add_chat_member))
        .route("/api/users/:user_id/profile", put(upsert_profile))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    forwarded_messages: u64,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, message: &str) -> Result<String, ServerError> {
    non_empty(value).ok_or_else(|| ServerError::BadRequest(message.to_string()))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        forwarded_messages: state.relay_stats.forwarded.load(Ordering::Relaxed),
    })
}

async fn create_call(
    State(state): State<AppState>,
    Json(req): Json<CreateCallRequest>,
) -> Result<Json<CallResponse>, ServerError> {
    let (Some(user_id), Some(chat_id)) = (non_empty(req.user_id), non_empty(req.chat_id)) else {
        return Err(ServerError::BadRequest("Missing userId or chatId".into()));
    };

    let call = state
        .directory
        .create_call(&ChatId(chat_id), &ParticipantId(user_id))
        .await?;

    info!(call = %call.id, chat = %call.chat_id, "Group call created");
    Ok(Json(CallResponse { call }))
}

async fn join_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<MembershipRequest>,
) -> Result<Json<SuccessResponse>, ServerError> {
    let user_id = required(req.user_id, "Missing userId or call_id")?;
    state
        .directory
        .join(&CallId(call_id), &ParticipantId(user_id))
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn leave_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    Json(req): Json<MembershipRequest>,
) -> Result<Json<SuccessResponse>, ServerError> {
    let user_id = required(req.user_id, "Missing userId or call_id")?;
    state
        .directory
        .leave(&CallId(call_id), &ParticipantId(user_id))
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn list_calls(
    State(state): State<AppState>,
    Query(query): Query<ListCallsQuery>,
) -> Result<Json<CallsResponse>, ServerError> {
    let user_id = required(query.user_id, "Missing userId")?;
    let calls = state.directory.calls_for(&ParticipantId(user_id)).await?;
    Ok(Json(CallsResponse { calls }))
}

async fn list_participants(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<ParticipantsResponse>, ServerError> {
    let participants = state.directory.participants(&CallId(call_id)).await?;
    Ok(Json(ParticipantsResponse { participants }))
}

async fn add_chat_member(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(req): Json<MembershipRequest>,
) -> Result<Json<SuccessResponse>, ServerError> {
    let user_id = required(req.user_id, "Missing userId")?;
    state
        .directory
        .database()
        .lock()
        .await
        .add_chat_member(&ChatId(chat_id), &ParticipantId(user_id))?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn upsert_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(profile): Json<Profile>,
) -> Result<Json<SuccessResponse>, ServerError> {
    state
        .directory
        .database()
        .lock()
        .await
        .upsert_profile(&ParticipantId(user_id), &profile)?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use meshcall_store::Database;

    use super::*;

    fn app() -> Router {
        build_router(AppState {
            directory: SqliteDirectory::new(Database::open_in_memory().unwrap()),
            relay_stats: Arc::new(RelayStats::default()),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["forwarded_messages"], 0);
    }

    #[tokio::test]
    async fn test_create_requires_fields() {
        let app = app();
        let (status, body) =
            send(&app, "POST", "/api/group-calls", Some(json!({ "userId": "alice" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing userId or chatId");

        let (status, _) = send(
            &app,
            "POST",
            "/api/group-calls",
            Some(json!({ "userId": "", "chatId": "chat-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_call_lifecycle() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/group-calls",
            Some(json!({ "userId": "alice", "chatId": "chat-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let call_id = body["call"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["call"]["chat_id"], "chat-1");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/group-calls/{call_id}/join"),
            Some(json!({ "userId": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = send(
            &app,
            "GET",
            &format!("/api/group-calls/{call_id}/participants"),
            None,
        )
        .await;
        assert_eq!(body["participants"].as_array().unwrap().len(), 2);

        for user in ["alice", "bob"] {
            let (status, _) = send(
                &app,
                "POST",
                &format!("/api/group-calls/{call_id}/leave"),
                Some(json!({ "userId": user })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/group-calls/{call_id}/join"),
            Some(json!({ "userId": "carol" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains(&call_id));
    }

    #[tokio::test]
    async fn test_join_requires_user() {
        let (status, body) =
            send(&app(), "POST", "/api/group-calls/c-1/join", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing userId or call_id");
    }

    #[tokio::test]
    async fn test_list_calls_by_chat_membership() {
        let app = app();

        let (status, body) = send(&app, "GET", "/api/group-calls", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing userId");

        send(
            &app,
            "POST",
            "/api/chats/chat-1/participants",
            Some(json!({ "userId": "bob" })),
        )
        .await;
        send(
            &app,
            "POST",
            "/api/group-calls",
            Some(json!({ "userId": "alice", "chatId": "chat-1" })),
        )
        .await;

        let (status, body) = send(&app, "GET", "/api/group-calls?userId=bob", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["calls"].as_array().unwrap().len(), 1);

        let (_, body) = send(&app, "GET", "/api/group-calls?userId=dave", None).await;
        assert!(body["calls"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_participants_include_profiles() {
        let app = app();
        let (status, _) = send(
            &app,
            "PUT",
            "/api/users/alice/profile",
            Some(json!({ "username": "alice", "display_name": "Alice", "avatar_url": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(
            &app,
            "POST",
            "/api/group-calls",
            Some(json!({ "userId": "alice", "chatId": "chat-1" })),
        )
        .await;
        let call_id = body["call"]["id"].as_str().unwrap().to_string();

        let (_, body) = send(
            &app,
            "GET",
            &format!("/api/group-calls/{call_id}/participants"),
            None,
        )
        .await;
        assert_eq!(body["participants"][0]["profile"]["display_name"], "Alice");
    }
}
