//! Chat agent implementation with tool execution loop

use super::prompt::system_prompt;
use super::ConversationContext;
use crate::llm::{LlmError, LlmProvider, LlmResponse, Message, StreamCallback, StreamEvent};
use crate::protocol::{ChatFailure, ChatStreamEvent};
use crate::tools::{ToolRegistry, ToolResult};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Tool calls honored per model turn; extra calls are dropped
const MAX_TOOL_CALLS_PER_TURN: usize = 5;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// The event receiver was dropped, usually because the client went away
    #[error("Chat stream receiver closed")]
    Disconnected,
}

/// A single tool call log entry
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolCallLog {
    pub tool: String,
    pub args: serde_json::Value,
    pub success: bool,
}

/// Summary of one completed exchange
#[derive(Debug)]
pub struct AgentResponse {
    pub message_id: String,
    pub text: String,
    pub thinking: String,
    pub tool_call_log: Vec<ToolCallLog>,
    pub usage: Option<crate::llm::TokenUsage>,
}

/// Writes chat events for one assistant message, opening it lazily
struct EventSink {
    tx: mpsc::Sender<ChatStreamEvent>,
    message_id: String,
    started: bool,
}

impl EventSink {
    async fn send(&mut self, event: ChatStreamEvent) -> Result<(), AgentError> {
        if !self.started {
            self.started = true;
            self.tx
                .send(ChatStreamEvent::Start {
                    message_id: self.message_id.clone(),
                })
                .await
                .map_err(|_| AgentError::Disconnected)?;
        }
        self.tx
            .send(event)
            .await
            .map_err(|_| AgentError::Disconnected)
    }

    /// Forward a model stream event; tool-call fragments are reported later,
    /// once arguments are complete
    async fn forward(&mut self, event: StreamEvent) -> Result<(), AgentError> {
        let message_id = self.message_id.clone();
        match event {
            StreamEvent::TextDelta(delta) if !delta.is_empty() => {
                self.send(ChatStreamEvent::TextDelta { message_id, delta })
                    .await
            }
            StreamEvent::ThinkingDelta(delta) if !delta.is_empty() => {
                self.send(ChatStreamEvent::ThinkingDelta { message_id, delta })
                    .await
            }
            _ => Ok(()),
        }
    }
}

/// Drives the model and tools for one exchange
pub struct ChatAgent {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    max_iterations: usize,
    max_history: usize,
}

impl ChatAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            llm,
            tools,
            max_iterations: 5,
            max_history: 100,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Cap on messages replayed to the model per call
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }

    /// Answer the last message of `history`, writing events to `events`.
    ///
    /// Nothing is sent until the model produces output, so a failure of the
    /// first model call leaves the channel empty and the caller can still
    /// answer with an HTTP status. Later failures are sent as an `error`
    /// event before returning.
    pub async fn run(
        &self,
        history: Vec<Message>,
        events: mpsc::Sender<ChatStreamEvent>,
    ) -> Result<AgentResponse, AgentError> {
        let mut sink = EventSink {
            tx: events,
            message_id: format!("msg_{}", uuid::Uuid::new_v4().simple()),
            started: false,
        };

        match self.run_loop(history, &mut sink).await {
            Ok(response) => Ok(response),
            Err(AgentError::Llm(e)) if sink.started => {
                tracing::error!(error = %e, "Model failed mid-stream");
                let message = ChatFailure::classify(&e).message();
                // The receiver may already be gone; the model error is what matters
                let _ = sink.tx.send(ChatStreamEvent::Error { message }).await;
                Err(AgentError::Llm(e))
            }
            Err(e) => Err(e),
        }
    }

    async fn run_loop(
        &self,
        history: Vec<Message>,
        sink: &mut EventSink,
    ) -> Result<AgentResponse, AgentError> {
        let message_id = sink.message_id.clone();
        let mut context = ConversationContext::new(system_prompt(&self.tools.names()))
            .with_max_messages(self.max_history);
        context.extend_history(history);

        let tool_definitions = self.tools.definitions();
        let mut text = String::new();
        let mut thinking = String::new();
        let mut tool_call_log = Vec::new();
        let mut usage = crate::llm::TokenUsage::default();

        for iteration in 0..self.max_iterations {
            tracing::debug!(iteration, messages = context.messages().len(), "Calling model");

            let (event_tx, mut event_rx) = mpsc::unbounded_channel::<StreamEvent>();
            let callback: StreamCallback = Box::new(move |event| {
                let _ = event_tx.send(event);
            });

            let model_call =
                self.llm
                    .chat_streaming(context.messages(), Some(&tool_definitions), callback);
            let forward = async {
                while let Some(event) = event_rx.recv().await {
                    match &event {
                        StreamEvent::TextDelta(delta) => text.push_str(delta),
                        StreamEvent::ThinkingDelta(delta) => thinking.push_str(delta),
                        _ => {}
                    }
                    sink.forward(event).await?;
                }
                Ok::<(), AgentError>(())
            };
            let (response, forwarded) = tokio::join!(model_call, forward);
            let response = response?;
            forwarded?;

            if let Some(turn_usage) = response.usage() {
                usage.add(turn_usage);
            }

            match response {
                LlmResponse::Text { text: reply, .. } => {
                    context.add_assistant(reply);
                    sink.send(ChatStreamEvent::Done {
                        message_id: message_id.clone(),
                    })
                    .await?;
                    tracing::info!(
                        tools_used = tool_call_log.len(),
                        total_tokens = usage.total_tokens,
                        "Exchange complete"
                    );
                    return Ok(AgentResponse {
                        message_id,
                        text,
                        thinking,
                        tool_call_log,
                        usage: Some(usage),
                    });
                }
                LlmResponse::ToolCalls {
                    text: preamble,
                    calls,
                    ..
                } => {
                    if calls.len() > MAX_TOOL_CALLS_PER_TURN {
                        tracing::warn!(
                            "Model requested {} tools in a single turn, limiting to {}",
                            calls.len(),
                            MAX_TOOL_CALLS_PER_TURN
                        );
                    }
                    let calls = &calls[..calls.len().min(MAX_TOOL_CALLS_PER_TURN)];
                    context.add_assistant_tool_calls(preamble.as_deref(), calls);

                    for call in calls {
                        sink.send(ChatStreamEvent::ToolCall {
                            message_id: message_id.clone(),
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            input: call.arguments.clone(),
                        })
                        .await?;

                        let result = self
                            .tools
                            .execute(&call.name, call.arguments.clone())
                            .await
                            .unwrap_or_else(|e| ToolResult::error(e.to_string()));
                        if !result.success {
                            tracing::warn!(tool = %call.name, "Tool failed: {}", result.output);
                        }

                        let output = if result.success {
                            result.output_value()
                        } else {
                            serde_json::json!({ "error": result.output })
                        };
                        sink.send(ChatStreamEvent::ToolResult {
                            message_id: message_id.clone(),
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            output,
                        })
                        .await?;

                        context.add_tool_result(&call.id, &call.name, &result.output);
                        tool_call_log.push(ToolCallLog {
                            tool: call.name.clone(),
                            args: call.arguments.clone(),
                            success: result.success,
                        });
                    }
                }
            }
        }

        tracing::warn!(max = self.max_iterations, "Reached maximum model iterations");
        let notice = "\n\n検索の上限に達しました。質問を絞って、もう一度お試しください。";
        text.push_str(notice);
        sink.send(ChatStreamEvent::TextDelta {
            message_id: message_id.clone(),
            delta: notice.to_string(),
        })
        .await?;
        sink.send(ChatStreamEvent::Done {
            message_id: message_id.clone(),
        })
        .await?;

        Ok(AgentResponse {
            message_id,
            text,
            thinking,
            tool_call_log,
            usage: Some(usage),
        })
    }
}
