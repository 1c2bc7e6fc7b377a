//! Deterministic provider for tests and offline runs
//!
//! Plays back queued turns, or in demo mode answers every question by
//! searching the catalog and summarizing the tool result.

use super::{
    ContentPart, LlmError, LlmProvider, LlmResponse, Message, Role, StreamCallback, StreamEvent,
    StreamingResponseBuilder, ToolDefinition,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// One step inside a scripted model response
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    Thinking(String),
    Text(String),
    ToolCall { name: String, arguments: Value },
}

/// A full model response to play back
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Emit the steps and finish normally
    Reply(Vec<ScriptedStep>),
    /// Fail before emitting anything, as an HTTP error from upstream would
    Fail { status: u16, message: String },
    /// Emit the steps, then fail mid-stream
    Interrupted {
        steps: Vec<ScriptedStep>,
        message: String,
    },
}

impl ScriptedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedTurn::Reply(vec![ScriptedStep::Text(text.into())])
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        ScriptedTurn::Reply(vec![ScriptedStep::ToolCall {
            name: name.into(),
            arguments,
        }])
    }
}

enum Script {
    Queue(Mutex<VecDeque<ScriptedTurn>>),
    CatalogDemo,
}

pub struct ScriptedProvider {
    script: Script,
    next_call_id: AtomicUsize,
    requests: AtomicUsize,
}

impl ScriptedProvider {
    /// Play back `turns` in order, one per model call
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(turns.into_iter().collect())),
            next_call_id: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    /// Answer every question with a `searchTabiwa` lookup of the user text
    pub fn catalog_demo() -> Self {
        Self {
            script: Script::CatalogDemo,
            next_call_id: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of model calls served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn next_turn(&self, messages: &[Message]) -> ScriptedTurn {
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front())
                .unwrap_or_else(|| ScriptedTurn::text("(no scripted reply)")),
            Script::CatalogDemo => demo_turn(messages),
        }
    }

    fn play(
        &self,
        steps: Vec<ScriptedStep>,
        builder: &mut StreamingResponseBuilder,
        callback: &dyn Fn(StreamEvent),
    ) {
        for step in steps {
            let events = match step {
                ScriptedStep::Thinking(text) => vec![StreamEvent::ThinkingDelta(text)],
                ScriptedStep::Text(text) => vec![StreamEvent::TextDelta(text)],
                ScriptedStep::ToolCall { name, arguments } => {
                    let id = format!(
                        "call_{}",
                        self.next_call_id.fetch_add(1, Ordering::SeqCst) + 1
                    );
                    vec![
                        StreamEvent::ToolCallStart {
                            id: id.clone(),
                            name,
                            thought_signature: None,
                        },
                        StreamEvent::ToolCallDelta {
                            id: id.clone(),
                            arguments_delta: arguments.to_string(),
                        },
                        StreamEvent::ToolCallComplete { id },
                    ]
                }
            };
            for event in events {
                builder.process(&event);
                callback(event);
            }
        }
    }

    fn respond(
        &self,
        messages: &[Message],
        callback: &dyn Fn(StreamEvent),
    ) -> Result<LlmResponse, LlmError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut builder = StreamingResponseBuilder::new();
        match self.next_turn(messages) {
            ScriptedTurn::Reply(steps) => {
                self.play(steps, &mut builder, callback);
                Ok(builder.build())
            }
            ScriptedTurn::Fail { status, message } => {
                let status = reqwest::StatusCode::from_u16(status)
                    .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
                Err(LlmError::from_http_status(status, message))
            }
            ScriptedTurn::Interrupted { steps, message } => {
                self.play(steps, &mut builder, callback);
                Err(LlmError::ServiceError(message))
            }
        }
    }
}

/// Demo script: look up the latest question, then summarize what came back
fn demo_turn(messages: &[Message]) -> ScriptedTurn {
    let Some(last) = messages.last() else {
        return ScriptedTurn::text("ご質問をどうぞ。");
    };

    if last.role == Role::Tool {
        let output = last.content.parts().into_iter().find_map(|part| match part {
            ContentPart::ToolResult { content, .. } => Some(content),
            _ => None,
        });
        return ScriptedTurn::text(summarize_catalog_output(output.as_deref().unwrap_or("")));
    }

    let question = last.content.as_text().unwrap_or("").trim().to_string();
    let query = question
        .trim_end_matches(['?', '？', '!', '！', '。'])
        .to_string();
    ScriptedTurn::Reply(vec![
        ScriptedStep::Thinking(format!("「{}」でチケットを検索します。", query)),
        ScriptedStep::ToolCall {
            name: "searchTabiwa".to_string(),
            arguments: serde_json::json!({ "query": query }),
        },
    ])
}

fn summarize_catalog_output(output: &str) -> String {
    let parsed: Value = serde_json::from_str(output).unwrap_or(Value::Null);
    let results = parsed
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if results.is_empty() {
        return "該当するチケットは見つかりませんでした。エリア名や観光地名でお試しください。"
            .to_string();
    }

    let mut reply = format!("**{}件**のチケットが見つかりました。\n", results.len());
    for pass in &results {
        let name = pass.get("name").and_then(Value::as_str).unwrap_or("?");
        let price = pass.get("price").and_then(Value::as_u64).unwrap_or(0);
        let days = pass.get("validDays").and_then(Value::as_u64).unwrap_or(0);
        let url = pass.get("url").and_then(Value::as_str).unwrap_or("");
        reply.push_str(&format!(
            "- [{}]({}) {}円 / {}日間\n",
            name, url, price, days
        ));
    }
    reply.trim_end().to_string()
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(
        &self,
        messages: &[Message],
        _tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse, LlmError> {
        self.respond(messages, &|_| {})
    }

    async fn chat_streaming(
        &self,
        messages: &[Message],
        _tools: Option<&[ToolDefinition]>,
        callback: StreamCallback,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.respond(messages, &*callback)?;
        callback(StreamEvent::Done);
        Ok(response)
    }
}
