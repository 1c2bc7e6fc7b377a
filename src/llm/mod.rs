//! LLM provider implementations

use crate::config::Config;

mod error;
mod gemini;
mod scripted;
pub mod streaming;
mod types;

pub use error::{looks_rate_limited, LlmError};
pub use gemini::GeminiProvider;
pub use scripted::{ScriptedProvider, ScriptedStep, ScriptedTurn};
pub use types::*;

use async_trait::async_trait;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Model identifier sent upstream
    fn model(&self) -> &str;

    /// Send a chat completion request (non-streaming)
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse, LlmError>;

    /// Send a streaming chat completion request
    ///
    /// The callback is invoked for each chunk as it arrives. The default
    /// implementation falls back to [`LlmProvider::chat`] and replays the
    /// complete response as events.
    async fn chat_streaming(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        callback: StreamCallback,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.chat(messages, tools).await?;

        if let Some(text) = response.text() {
            callback(StreamEvent::TextDelta(text.to_string()));
        }
        for call in response.tool_calls() {
            callback(StreamEvent::ToolCallStart {
                id: call.id.clone(),
                name: call.name.clone(),
                thought_signature: call.thought_signature.clone(),
            });
            callback(StreamEvent::ToolCallDelta {
                id: call.id.clone(),
                arguments_delta: call.arguments.to_string(),
            });
            callback(StreamEvent::ToolCallComplete {
                id: call.id.clone(),
            });
        }

        callback(StreamEvent::Done);
        Ok(response)
    }
}

/// Create the provider named in config.
///
/// Fails with [`LlmError::MissingCredential`] when the Gemini key is unset, so
/// callers can report a configuration error without contacting upstream.
pub fn create_provider(config: &Config) -> Result<Box<dyn LlmProvider>, LlmError> {
    match config.llm.provider.to_lowercase().as_str() {
        "gemini" | "google" => {
            let api_key = config
                .api_key()
                .ok_or_else(|| LlmError::MissingCredential(config.llm.api_key_env.clone()))?;
            Ok(Box::new(
                GeminiProvider::new(api_key)
                    .with_model(&config.llm.model)
                    .with_max_tokens(config.llm.max_tokens)
                    .with_temperature(config.llm.temperature),
            ))
        }
        "scripted" | "offline" => Ok(Box::new(ScriptedProvider::catalog_demo())),
        other => Err(LlmError::Other(anyhow::anyhow!(
            "Unknown provider: {}. Supported: gemini, scripted",
            other
        ))),
    }
}
