//! services/pulse_api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use pulse_core::{Message, PortError, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        chat_history_handler,
        mark_read_handler,
        unread_count_handler,
        presence_handler,
    ),
    components(
        schemas(MessageResponse, MarkReadRequest, MarkReadResponse, UnreadCountResponse, PresenceResponse, ErrorResponse)
    ),
    tags(
        (name = "Pulse Messaging API", description = "Direct message history and live presence.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// One stored direct message, as returned by the history endpoint.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    id: uuid::Uuid,
    sender_id: String,
    receiver_id: String,
    text: String,
    read: bool,
    conversation_id: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            sender_id: m.sender_id.to_string(),
            receiver_id: m.receiver_id.to_string(),
            text: m.text,
            read: m.read,
            conversation_id: m.conversation_id.to_string(),
            created_at: m.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    /// The reader.
    pub user_id: String,
    /// The other participant, whose messages get marked read.
    pub other_user_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct MarkReadResponse {
    success: bool,
    updated: u64,
}

#[derive(Serialize, ToSchema)]
pub struct UnreadCountResponse {
    count: u64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    user_id: String,
    status: String,
    sessions: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    message: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// Maps a port failure onto an HTTP status and a client-safe message.
pub fn port_error_response(e: &PortError) -> HandlerError {
    let (status, message) = match e {
        PortError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        PortError::Persistence(_) | PortError::Delivery(_) | PortError::Unexpected(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
        }
    };
    (status, Json(ErrorResponse { message }))
}

fn require_id(raw: &str, field: &str) -> Result<UserId, HandlerError> {
    let id = UserId::from(raw);
    if id.is_blank() {
        return Err(port_error_response(&PortError::Validation(format!(
            "{} must not be empty",
            field
        ))));
    }
    Ok(id)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness probe.
pub async fn root_handler() -> &'static str {
    "Pulse Backend is pulsing!"
}

/// Full message history between two users, oldest first.
#[utoipa::path(
    get,
    path = "/api/messages/{userId}/{otherUserId}",
    params(
        ("userId" = String, Path, description = "One participant."),
        ("otherUserId" = String, Path, description = "The other participant.")
    ),
    responses(
        (status = 200, description = "Messages ordered oldest first", body = [MessageResponse]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn chat_history_handler(
    State(app_state): State<Arc<AppState>>,
    Path((user_id, other_user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, HandlerError> {
    let user_id = require_id(&user_id, "userId")?;
    let other_user_id = require_id(&other_user_id, "otherUserId")?;

    let history = app_state
        .messages()
        .history(&user_id, &other_user_id)
        .await
        .map_err(|e| {
            error!("Failed to load chat history: {:?}", e);
            port_error_response(&e)
        })?;

    let body: Vec<MessageResponse> = history.into_iter().map(MessageResponse::from).collect();
    Ok(Json(body))
}

/// Marks every message the other user sent to the reader as read.
#[utoipa::path(
    post,
    path = "/api/messages/read",
    request_body = MarkReadRequest,
    responses(
        (status = 200, description = "Messages marked read", body = MarkReadResponse),
        (status = 400, description = "Missing user id", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn mark_read_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let reader = require_id(&req.user_id, "userId")?;
    let other = require_id(&req.other_user_id, "otherUserId")?;

    let updated = app_state
        .hub
        .mark_read(&reader, &other)
        .await
        .map_err(|e| {
            error!("Failed to mark messages read: {:?}", e);
            port_error_response(&e)
        })?;

    Ok(Json(MarkReadResponse {
        success: true,
        updated,
    }))
}

/// Number of unread messages the other user has sent to the reader.
#[utoipa::path(
    get,
    path = "/api/messages/unread/{userId}/{otherUserId}",
    params(
        ("userId" = String, Path, description = "The reader."),
        ("otherUserId" = String, Path, description = "The sender whose messages are counted.")
    ),
    responses(
        (status = 200, description = "Unread count", body = UnreadCountResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn unread_count_handler(
    State(app_state): State<Arc<AppState>>,
    Path((user_id, other_user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, HandlerError> {
    let reader = require_id(&user_id, "userId")?;
    let other = require_id(&other_user_id, "otherUserId")?;

    let count = app_state
        .messages()
        .unread_count(&reader, &other)
        .await
        .map_err(|e| {
            error!("Failed to count unread messages: {:?}", e);
            port_error_response(&e)
        })?;

    Ok(Json(UnreadCountResponse { count }))
}

/// Live presence for a user, read from the in-process session registry.
#[utoipa::path(
    get,
    path = "/api/presence/{userId}",
    params(("userId" = String, Path, description = "The user to look up.")),
    responses((status = 200, description = "Current presence", body = PresenceResponse))
)]
pub async fn presence_handler(
    State(app_state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let user_id = require_id(&user_id, "userId")?;
    let snapshot = app_state.hub.presence_of(&user_id).await;
    let status = if snapshot.online { "online" } else { "offline" };
    Ok(Json(PresenceResponse {
        user_id: snapshot.user_id.to_string(),
        status: status.to_string(),
        sessions: snapshot.sessions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let (status, body) = port_error_response(&PortError::Validation("bad".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0.message, "bad");
    }

    #[test]
    fn persistence_details_are_not_leaked() {
        let (status, body) =
            port_error_response(&PortError::Persistence("connection refused".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0.message, "Server error");
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(require_id("  ", "userId").is_err());
        assert!(require_id("uid", "userId").is_ok());
    }

    #[test]
    fn openapi_lists_message_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        assert!(paths.contains(&"/api/messages/read".to_string()));
        assert!(paths.contains(&"/api/messages/{userId}/{otherUserId}".to_string()));
    }
}
