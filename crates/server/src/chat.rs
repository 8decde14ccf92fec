//! `POST /chat`: run one turn of conversation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use nebula_core::message::{Conversation, ConversationId, Message};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{ErrorResponse, SharedState};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,

    /// Id handed out by `POST /chat/start`; also the conversation id.
    #[serde(default, rename = "userId")]
    pub user_id: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,

    /// Full history after this turn, projected for the frontend.
    pub history: Vec<HistoryEntry>,
}

/// One rendered history entry.
#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub sender: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<bool>,
}

/// Project stored messages into what the frontend renders.
///
/// Tool results and system prompts are internal and never shown; an
/// assistant message that only requests tools renders as a progress
/// marker.
pub fn project_history(messages: &[Message]) -> Vec<HistoryEntry> {
    let mut output = Vec::new();
    for message in messages {
        match message {
            Message::User { content, .. } => output.push(HistoryEntry {
                sender: "user",
                text: content.clone(),
                tool_calls: None,
            }),
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                if tool_calls.is_empty() {
                    output.push(HistoryEntry {
                        sender: "bot",
                        text: content.clone(),
                        tool_calls: None,
                    });
                } else {
                    let text = if content.is_empty() {
                        "Thinking...".to_string()
                    } else {
                        content.clone()
                    };
                    output.push(HistoryEntry {
                        sender: "bot",
                        text,
                        tool_calls: Some(true),
                    });
                }
            }
            Message::ToolResult { .. } | Message::System { .. } => {}
        }
    }
    output
}

pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Some(user_id) = payload.user_id else {
        return Err(bad_request("userId and message are required"));
    };
    if payload.message.trim().is_empty() {
        return Err(bad_request("userId and message are required"));
    }

    let conversation_id = ConversationId(user_id.to_string());
    info!(conversation_id = %conversation_id, "Chat request");

    // One turn at a time per conversation; held across read, run, write.
    let _guard = state.locks.acquire(&conversation_id.0).await;

    let conversation = match state.store.get(&conversation_id).await {
        Ok(Some(existing)) => existing,
        Ok(None) => Conversation::new(conversation_id.clone()),
        Err(e) => {
            error!(error = %e, "Failed to load conversation");
            return Err(internal_error("failed to load conversation"));
        }
    };

    let outcome = match state.engine.run(conversation, &payload.message).await {
        Ok(outcome) => outcome,
        Err(e) => return Err(bad_request(&e.to_string())),
    };

    if let Err(e) = state.store.put(outcome.conversation.clone()).await {
        error!(error = %e, "Failed to store conversation");
        return Err(internal_error("failed to store conversation"));
    }

    Ok(Json(ChatResponse {
        response: outcome.response,
        history: project_history(&outcome.conversation.messages),
    }))
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

fn internal_error(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}
