//! Wire types shared by the chat endpoint and its clients
//!
//! The chat stream is a sequence of SSE `data:` lines, each carrying one
//! JSON-encoded [`ChatStreamEvent`].

use crate::llm::{LlmError, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event on the chat stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatStreamEvent {
    /// An assistant message begins
    #[serde(rename_all = "camelCase")]
    Start { message_id: String },
    #[serde(rename_all = "camelCase")]
    ThinkingDelta { message_id: String, delta: String },
    #[serde(rename_all = "camelCase")]
    TextDelta { message_id: String, delta: String },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        message_id: String,
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        message_id: String,
        tool_call_id: String,
        tool_name: String,
        output: Value,
    },
    /// Failure after streaming started; the stream closes after this
    Error { message: String },
    #[serde(rename_all = "camelCase")]
    Done { message_id: String },
}

impl ChatStreamEvent {
    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatStreamEvent::Done { .. } | ChatStreamEvent::Error { .. })
    }
}

pub const RATE_LIMIT_MESSAGE: &str =
    "APIのレート制限に達しました。しばらく時間をおいてから再度お試しください。";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "エラーが発生しました。しばらく時間をおいてから再度お試しください。";

/// How a failed exchange is reported to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatFailure {
    /// Credential env var (named) is unset
    MissingCredential(String),
    RateLimited,
    Upstream,
}

impl ChatFailure {
    pub fn classify(error: &LlmError) -> Self {
        match error {
            LlmError::MissingCredential(name) => ChatFailure::MissingCredential(name.clone()),
            e if e.is_rate_limit() => ChatFailure::RateLimited,
            _ => ChatFailure::Upstream,
        }
    }

    /// HTTP status when the failure happens before streaming starts
    pub fn status(&self) -> u16 {
        match self {
            ChatFailure::RateLimited => 429,
            ChatFailure::MissingCredential(_) | ChatFailure::Upstream => 500,
        }
    }

    /// Client-facing message
    pub fn message(&self) -> String {
        match self {
            ChatFailure::MissingCredential(name) => format!("{} not configured", name),
            ChatFailure::RateLimited => RATE_LIMIT_MESSAGE.to_string(),
            ChatFailure::Upstream => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A text fragment inside a request message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// A prior message as sent by the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequestMessage {
    pub role: ChatRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<RequestPart>,
}

impl ChatRequestMessage {
    pub fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            parts: Vec::new(),
        }
    }

    /// Message text: `content` when present, else the joined text parts.
    /// Thinking parts are not replayed to the model.
    pub fn joined_text(&self) -> String {
        if let Some(content) = &self.content {
            return content.clone();
        }
        self.parts
            .iter()
            .filter(|part| part.kind == "text")
            .filter_map(|part| part.content.as_deref().or(part.text.as_deref()))
            .collect()
    }

    pub fn to_llm_message(&self) -> Message {
        match self.role {
            ChatRole::User => Message::user(self.joined_text()),
            ChatRole::Assistant => Message::assistant(self.joined_text()),
        }
    }
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatRequestMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    /// Conversation history for the model, skipping empty messages
    pub fn to_llm_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| !m.joined_text().trim().is_empty())
            .map(ChatRequestMessage::to_llm_message)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = ChatStreamEvent::ToolCall {
            message_id: "m1".into(),
            tool_call_id: "c1".into(),
            tool_name: "searchTabiwa".into(),
            input: json!({"query": "広島"}),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "tool-call",
                "messageId": "m1",
                "toolCallId": "c1",
                "toolName": "searchTabiwa",
                "input": {"query": "広島"}
            })
        );

        let parsed: ChatStreamEvent =
            serde_json::from_str(r#"{"type":"text-delta","messageId":"m1","delta":"こんにちは"}"#)
                .unwrap();
        assert_eq!(
            parsed,
            ChatStreamEvent::TextDelta {
                message_id: "m1".into(),
                delta: "こんにちは".into()
            }
        );
        assert!(ChatStreamEvent::Error { message: "x".into() }.is_terminal());
    }

    #[test]
    fn test_failure_classification() {
        let missing = ChatFailure::classify(&LlmError::MissingCredential("GEMINI_API_KEY".into()));
        assert_eq!(missing.status(), 500);
        assert_eq!(missing.message(), "GEMINI_API_KEY not configured");

        for text in ["429", "quota", "RESOURCE_EXHAUSTED", "Too Many Requests"] {
            let failure = ChatFailure::classify(&LlmError::ServiceError(format!("upstream: {text}")));
            assert_eq!(failure, ChatFailure::RateLimited, "{text}");
            assert_eq!(failure.status(), 429);
            assert_eq!(failure.message(), RATE_LIMIT_MESSAGE);
        }

        let generic = ChatFailure::classify(&LlmError::Network("connection reset".into()));
        assert_eq!(generic.status(), 500);
        assert_eq!(generic.message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_request_accepts_content_or_parts() {
        let request: ChatRequest = serde_json::from_value(json!({
            "messages": [
                {"role": "user", "content": "広島"},
                {"role": "assistant", "parts": [
                    {"type": "thinking", "content": "考え中"},
                    {"type": "text", "content": "a"},
                    {"type": "text", "text": "b"}
                ]},
                {"role": "user", "content": "   "}
            ],
            "conversationId": "conv-1"
        }))
        .unwrap();

        assert_eq!(request.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(request.messages[1].joined_text(), "ab");

        let messages = request.to_llm_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content.as_text(), Some("ab"));
    }
}
