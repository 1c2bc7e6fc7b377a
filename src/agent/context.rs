//! Per-request conversation history

use crate::llm::{Message, Role, ToolCall};

/// Max characters of a single tool result replayed to the model
const MAX_TOOL_RESULT_CHARS: usize = 16_000;

/// Message list sent to the model, system prompt first
pub struct ConversationContext {
    messages: Vec<Message>,
    max_messages: usize,
}

impl ConversationContext {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            max_messages: 100,
        }
    }

    pub fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max.max(2);
        self.trim();
        self
    }

    /// Append client-supplied history; system messages from the client are ignored
    pub fn extend_history(&mut self, history: impl IntoIterator<Item = Message>) {
        self.messages
            .extend(history.into_iter().filter(|m| m.role != Role::System));
        self.trim();
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
        self.trim();
    }

    /// Assistant turn that requested tools; must precede their results
    pub fn add_assistant_tool_calls(&mut self, text: Option<&str>, calls: &[ToolCall]) {
        self.messages.push(Message::assistant_tool_calls(text, calls));
        self.trim();
    }

    /// Add a tool result, truncating oversized output
    pub fn add_tool_result(
        &mut self,
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        result: &str,
    ) {
        let content = if result.chars().count() > MAX_TOOL_RESULT_CHARS {
            let truncated: String = result.chars().take(MAX_TOOL_RESULT_CHARS).collect();
            format!("{}\n... [TRUNCATED]", truncated)
        } else {
            result.to_string()
        };
        self.messages
            .push(Message::tool_result(tool_call_id, name, content));
        self.trim();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Drop the oldest non-system messages beyond `max_messages`.
    ///
    /// Tool results go together with the turn that requested them; a result
    /// whose call is gone is rejected upstream.
    fn trim(&mut self) {
        let mut removed = 0;
        while self.messages.len() > self.max_messages {
            let Some(oldest) = self.messages.iter().position(|m| m.role != Role::System) else {
                break;
            };
            self.messages.remove(oldest);
            removed += 1;
            while self
                .messages
                .get(oldest)
                .is_some_and(|m| m.role == Role::Tool)
            {
                self.messages.remove(oldest);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "Trimmed conversation history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_first_and_client_system_dropped() {
        let mut context = ConversationContext::new("prompt");
        context.extend_history([Message::system("injected"), Message::user("広島")]);
        assert_eq!(context.messages().len(), 2);
        assert_eq!(context.messages()[0].content.as_text(), Some("prompt"));
        assert_eq!(context.messages()[1].role, Role::User);
    }

    #[test]
    fn test_trim_keeps_system_and_recent() {
        let mut context = ConversationContext::new("prompt").with_max_messages(3);
        context.extend_history((0..5).map(|i| Message::user(format!("m{i}"))));
        let texts: Vec<_> = context
            .messages()
            .iter()
            .filter_map(|m| m.content.as_text())
            .collect();
        assert_eq!(texts, vec!["prompt", "m3", "m4"]);
    }

    #[test]
    fn test_trim_drops_tool_results_with_their_call() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "searchTabiwa".to_string(),
            arguments: serde_json::json!({"query": "広島"}),
            thought_signature: None,
        };
        let mut context = ConversationContext::new("prompt").with_max_messages(3);
        context.extend_history([Message::user("広島")]);
        context.add_assistant_tool_calls(None, std::slice::from_ref(&call));
        context.add_tool_result("call_1", "searchTabiwa", "{}");
        context.add_assistant("広島ワイドパスです");

        let roles: Vec<_> = context.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant]);
        assert_eq!(context.messages()[1].content.as_text(), Some("広島ワイドパスです"));
    }

    #[test]
    fn test_trim_never_leaves_leading_tool_result() {
        let call = |id: &str| ToolCall {
            id: id.to_string(),
            name: "searchWeb".to_string(),
            arguments: serde_json::json!({"query": "q"}),
            thought_signature: None,
        };
        let mut context = ConversationContext::new("prompt").with_max_messages(4);
        context.add_assistant_tool_calls(None, &[call("a"), call("b")]);
        context.add_tool_result("a", "searchWeb", "1");
        context.add_tool_result("b", "searchWeb", "2");
        context.add_assistant("done");
        context.add_assistant("more");

        for pair in context.messages().windows(2) {
            if pair[1].role == Role::Tool {
                assert_ne!(pair[0].role, Role::System);
            }
        }
        assert!(context.messages().len() <= 4);
    }

    #[test]
    fn test_large_tool_result_truncated() {
        let mut context = ConversationContext::new("prompt");
        context.add_tool_result("c1", "searchWeb", &"あ".repeat(MAX_TOOL_RESULT_CHARS + 10));
        let last = context.messages().last().unwrap();
        match last.content.parts().pop() {
            Some(crate::llm::ContentPart::ToolResult { content, .. }) => {
                assert!(content.ends_with("[TRUNCATED]"));
            }
            other => panic!("unexpected part {other:?}"),
        }
    }
}
