//! Chat session state
//!
//! One [`ChatSession`] owns the message list and the input buffer for a
//! single user. Exchanges move through [`ExchangeState`]:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Settled(Success | Error)
//!   ^                                 |
//!   +------------ submit -------------+
//! ```
//!
//! Only one exchange may be in flight; submission is refused outside `Idle`
//! and `Settled`.

use crate::protocol::{ChatRequest, ChatRequestMessage, ChatRole, ChatStreamEvent};
use chrono::{DateTime, Local};

/// How a finished exchange ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Success,
    Error(String),
}

/// Lifecycle of the current exchange
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    /// Request sent, nothing received yet
    Sending,
    /// Parts are arriving for the last assistant message
    Streaming,
    Settled(Settlement),
}

impl ExchangeState {
    /// Input and submit controls are enabled
    pub fn accepts_input(&self) -> bool {
        matches!(self, ExchangeState::Idle | ExchangeState::Settled(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Thinking,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePart {
    pub kind: PartKind,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub parts: Vec<MessagePart>,
    pub created_at: DateTime<Local>,
}

impl ChatMessage {
    fn new(id: String, role: ChatRole) -> Self {
        Self {
            id,
            role,
            parts: Vec::new(),
            created_at: Local::now(),
        }
    }

    /// Text parts joined in arrival order; thinking is left out
    pub fn displayed_text(&self) -> String {
        self.parts
            .iter()
            .filter(|part| part.kind == PartKind::Text)
            .map(|part| part.content.as_str())
            .collect()
    }

    /// Extend the last part when it has the same kind, else open a new one
    fn push_delta(&mut self, kind: PartKind, delta: &str) {
        match self.parts.last_mut() {
            Some(last) if last.kind == kind => last.content.push_str(delta),
            _ => self.parts.push(MessagePart {
                kind,
                content: delta.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Char(char),
    Backspace,
}

/// A key press as seen by the input box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub shift: bool,
    /// An IME composition is in progress
    pub composing: bool,
}

impl KeyEvent {
    pub fn plain(key: Key) -> Self {
        Self {
            key,
            shift: false,
            composing: false,
        }
    }
}

/// What a key press did
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    Submitted(ChatRequest),
    Edited,
    Ignored,
}

#[derive(Debug, Default)]
pub struct ChatSession {
    conversation_id: Option<String>,
    messages: Vec<ChatMessage>,
    input: String,
    state: ExchangeState,
    next_local_id: usize,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replace the input buffer; ignored while an exchange is in flight
    pub fn set_input(&mut self, text: impl Into<String>) {
        if self.state.accepts_input() {
            self.input = text.into();
        }
    }

    pub fn can_submit(&self) -> bool {
        self.state.accepts_input() && !self.input.trim().is_empty()
    }

    /// Typing indicator: waiting on the model and nothing to show yet
    pub fn shows_typing_indicator(&self) -> bool {
        match self.state {
            ExchangeState::Sending => true,
            ExchangeState::Streaming => self
                .messages
                .last()
                .map_or(true, |m| m.role == ChatRole::Assistant && m.parts.is_empty()),
            _ => false,
        }
    }

    pub fn handle_key(&mut self, event: KeyEvent) -> KeyOutcome {
        if !self.state.accepts_input() {
            return KeyOutcome::Ignored;
        }
        match event.key {
            // Enter confirms the IME candidate, not the message
            Key::Enter if event.composing => KeyOutcome::Ignored,
            Key::Enter if event.shift => {
                self.input.push('\n');
                KeyOutcome::Edited
            }
            Key::Enter => match self.submit() {
                Some(request) => KeyOutcome::Submitted(request),
                None => KeyOutcome::Ignored,
            },
            Key::Char(c) => {
                self.input.push(c);
                KeyOutcome::Edited
            }
            Key::Backspace => {
                if self.input.pop().is_some() {
                    KeyOutcome::Edited
                } else {
                    KeyOutcome::Ignored
                }
            }
        }
    }

    /// Start an exchange with the current input.
    ///
    /// The user message is appended and the input cleared before the request
    /// goes out. Returns `None` when submission is not allowed.
    pub fn submit(&mut self) -> Option<ChatRequest> {
        if !self.can_submit() {
            return None;
        }
        let text = std::mem::take(&mut self.input);
        let id = self.local_id();
        let mut message = ChatMessage::new(id, ChatRole::User);
        message.parts.push(MessagePart {
            kind: PartKind::Text,
            content: text,
        });
        self.messages.push(message);
        self.state = ExchangeState::Sending;
        tracing::debug!(messages = self.messages.len(), "Exchange started");
        Some(self.request())
    }

    /// Request body for the current history
    pub fn request(&self) -> ChatRequest {
        ChatRequest {
            messages: self
                .messages
                .iter()
                .map(|m| ChatRequestMessage::text(m.role, m.displayed_text()))
                .filter(|m| !m.joined_text().trim().is_empty())
                .collect(),
            conversation_id: self.conversation_id.clone(),
        }
    }

    /// Feed one stream event into the session
    pub fn apply(&mut self, event: &ChatStreamEvent) {
        match event {
            ChatStreamEvent::Start { message_id } => {
                if self.state != ExchangeState::Sending {
                    tracing::debug!(state = ?self.state, "Ignoring start outside an exchange");
                    return;
                }
                self.messages
                    .push(ChatMessage::new(message_id.clone(), ChatRole::Assistant));
                self.state = ExchangeState::Streaming;
            }
            ChatStreamEvent::ThinkingDelta { delta, .. } => self.append(PartKind::Thinking, delta),
            ChatStreamEvent::TextDelta { delta, .. } => self.append(PartKind::Text, delta),
            ChatStreamEvent::ToolCall { tool_name, .. } => {
                tracing::debug!(tool = %tool_name, "Tool called");
            }
            ChatStreamEvent::ToolResult { tool_name, .. } => {
                tracing::debug!(tool = %tool_name, "Tool returned");
            }
            ChatStreamEvent::Done { .. } => {
                if self.in_flight() {
                    self.state = ExchangeState::Settled(Settlement::Success);
                }
            }
            ChatStreamEvent::Error { message } => self.fail(message.clone()),
        }
    }

    /// Settle the in-flight exchange as failed (stream error or transport error)
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.in_flight() {
            self.state = ExchangeState::Settled(Settlement::Error(message.into()));
        }
    }

    /// Empty the input; true when something was cleared
    pub fn clear_input(&mut self) -> bool {
        if !self.state.accepts_input() || self.input.is_empty() {
            return false;
        }
        self.input.clear();
        true
    }

    /// Drop all messages and return to idle
    pub fn reset(&mut self) {
        self.messages.clear();
        self.input.clear();
        self.state = ExchangeState::Idle;
    }

    fn in_flight(&self) -> bool {
        matches!(self.state, ExchangeState::Sending | ExchangeState::Streaming)
    }

    fn append(&mut self, kind: PartKind, delta: &str) {
        if self.state != ExchangeState::Streaming {
            tracing::debug!(?kind, "Dropping delta outside streaming");
            return;
        }
        if let Some(message) = self
            .messages
            .last_mut()
            .filter(|m| m.role == ChatRole::Assistant)
        {
            message.push_delta(kind, delta);
        }
    }

    fn local_id(&mut self) -> String {
        self.next_local_id += 1;
        format!("local-{}", self.next_local_id)
    }
}
