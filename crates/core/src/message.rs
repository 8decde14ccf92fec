//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the whole service:
//! the HTTP layer appends user messages, the turn engine produces
//! assistant and tool-result messages, the store keeps the ordered
//! history per conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (one per registered user).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// An id is usable only if it carries at least one non-whitespace char.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single message in a conversation.
///
/// Modeled as a tagged union so every consumer has to say what it does
/// with each kind of message; there is no "role plus optional fields"
/// shape to inspect at runtime.
///
/// Pairing invariant: a `ToolResult` is only ever appended after an
/// `Assistant` message whose `tool_calls` contains a matching `call_id`.
/// The turn engine is the sole producer of that pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Sent by the end user.
    User {
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// Produced by the model: a final text answer, a request to invoke
    /// tools, or both at once.
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
        timestamp: DateTime<Utc>,
    },

    /// Output of one tool invocation, fed back to the model.
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// Instructions assembled per model call; never stored in history.
    System {
        content: String,
        timestamp: DateTime<Utc>,
    },
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant message with no tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create an assistant message that requests tool invocations.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
            timestamp: Utc::now(),
        }
    }

    /// Create a tool result message.
    pub fn tool_result(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// The text content, regardless of kind.
    pub fn content(&self) -> &str {
        match self {
            Self::User { content, .. }
            | Self::Assistant { content, .. }
            | Self::ToolResult { content, .. }
            | Self::System { content, .. } => content,
        }
    }

    /// Short kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolResult { .. } => "tool_result",
            Self::System { .. } => "system",
        }
    }

    /// Tool calls carried by this message (empty for non-assistant kinds).
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// A structured request from the model to invoke one named tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlates the eventual tool result back to this request.
    pub id: String,

    /// Name of the tool to invoke.
    pub name: String,

    /// Arguments as a JSON object.
    pub arguments: serde_json::Value,
}

/// An ordered, append-only sequence of messages for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,

    /// Ordered messages; new turns append, never mutate.
    pub messages: Vec<Message>,

    pub created_at: DateTime<Utc>,

    /// When the last message was added. Drives store eviction.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation with the given id.
    pub fn new(id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, Nebula!");
        assert_eq!(msg.kind(), "user");
        assert_eq!(msg.content(), "Hello, Nebula!");
        assert!(msg.tool_calls().is_empty());
    }

    #[test]
    fn assistant_with_calls_carries_them_in_order() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![
                ToolCallRequest {
                    id: "call_1".into(),
                    name: "fetch_job_description_content".into(),
                    arguments: serde_json::json!({"url": "https://example.com/a"}),
                },
                ToolCallRequest {
                    id: "call_2".into(),
                    name: "fetch_job_description_content".into(),
                    arguments: serde_json::json!({"url": "https://example.com/b"}),
                },
            ],
        );
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[1].id, "call_2");
    }

    #[test]
    fn message_serialization_is_kind_tagged() {
        let msg = Message::tool_result("call_9", "fetch_job_description_content", "body text");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "tool_result");
        assert_eq!(json["call_id"], "call_9");
        assert_eq!(json["tool_name"], "fetch_job_description_content");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.content(), "body text");
        assert_eq!(back.kind(), "tool_result");
    }

    #[test]
    fn assistant_without_calls_omits_field() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert!(!json.contains("tool_calls"));
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new(ConversationId::from("42"));
        let created = conv.created_at;

        conv.push(Message::user("First message"));
        assert_eq!(conv.len(), 1);
        assert!(conv.updated_at >= created);
    }

    #[test]
    fn empty_conversation_id_detected() {
        assert!(ConversationId::from("  ").is_empty());
        assert!(!ConversationId::from("42").is_empty());
    }
}
