//! REST handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::delivery::DeliverySnapshot;
use crate::error::SessionError;
use crate::server::{ApiError, AppState};
use crate::session::{ChatSummary, ConversationId};

const LIVENESS_MESSAGE: &str = "WhatsApp to Slack Forwarder is running";

/// Body of `POST /api/select` and `POST /api/deselect`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedResponse {
    pub selected_chats: Vec<ConversationId>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResponse {
    pub success: bool,
    pub message: &'static str,
    pub selected_chats: Vec<ConversationId>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub selected_chats_count: usize,
    pub server_port: u16,
    pub has_slack_webhook: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub whatsapp_ready: bool,
    pub timestamp: DateTime<Utc>,
    pub selected_chats: usize,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Pull a non-empty `chatId` out of the request body.
///
/// A missing, malformed, or non-JSON body is treated the same as an absent
/// field.
fn required_chat_id(payload: Result<Json<ChatRequest>, JsonRejection>) -> Result<String, ApiError> {
    let chat_id = match payload {
        Ok(Json(request)) => request.chat_id,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unreadable selection request body");
            None
        }
    };
    chat_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("chatId is required".to_string()))
}

/// GET /api/chats
///
/// Refreshes the chat list from the session. A failed refresh serves the
/// list cached at `ready` when there is one.
pub async fn list_chats(State(state): State<AppState>) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    if !state.session.is_ready().await {
        return Err(ApiError::NotReady);
    }

    match state.controller.refresh_chats().await {
        Ok(chats) => Ok(Json(chats)),
        Err(SessionError::NotReady) => Err(ApiError::NotReady),
        Err(e) => {
            let cached = state.session.chats().await;
            if cached.is_empty() {
                return Err(ApiError::Internal(e.to_string()));
            }
            tracing::warn!(error = %e, cached = cached.len(), "Chat refresh failed, serving cached list");
            Ok(Json(cached))
        }
    }
}

/// GET /api/selected
pub async fn selected_chats(State(state): State<AppState>) -> Json<SelectedResponse> {
    let selected_chats = state.selection.all().await;
    Json(SelectedResponse {
        count: selected_chats.len(),
        selected_chats,
    })
}

/// POST /api/select
pub async fn select_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<SelectionResponse>, ApiError> {
    let chat_id = required_chat_id(payload)?;
    state.selection.add(&chat_id).await;
    tracing::info!(chat_id = %chat_id, "Chat selected via API");
    state.hub.broadcast_selection().await;
    Ok(Json(
        selection_response(&state, "Chat selected successfully").await,
    ))
}

/// POST /api/deselect
pub async fn deselect_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<SelectionResponse>, ApiError> {
    let chat_id = required_chat_id(payload)?;
    state.selection.remove(&chat_id).await;
    tracing::info!(chat_id = %chat_id, "Chat deselected via API");
    state.hub.broadcast_selection().await;
    Ok(Json(
        selection_response(&state, "Chat deselected successfully").await,
    ))
}

async fn selection_response(state: &AppState, message: &'static str) -> SelectionResponse {
    let selected_chats = state.selection.all().await;
    SelectionResponse {
        success: true,
        message,
        count: selected_chats.len(),
        selected_chats,
    }
}

/// GET /api/config
pub async fn config_summary(State(state): State<AppState>) -> Json<ConfigSummary> {
    Json(ConfigSummary {
        selected_chats_count: state.selection.len().await,
        server_port: state.selection.server_port().await,
        has_slack_webhook: state.selection.has_endpoint().await,
    })
}

/// GET /api/health
pub async fn api_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        whatsapp_ready: state.session.is_ready().await,
        timestamp: Utc::now(),
        selected_chats: state.selection.len().await,
    })
}

/// GET /api/stats
pub async fn delivery_stats(State(state): State<AppState>) -> Json<DeliverySnapshot> {
    Json(state.metrics.snapshot())
}

/// GET /health
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "healthy",
        message: LIVENESS_MESSAGE,
        timestamp: Utc::now(),
    })
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
