//! Google Gemini LLM provider implementation
//!
//! SECURITY: the API key is only sent to the official Google endpoint, in the
//! `x-goog-api-key` header rather than the query string.

use super::{
    ContentPart, LlmError, LlmProvider, LlmResponse, Message, MessageContent, Role,
    StreamCallback, StreamEvent, StreamingResponseBuilder, TokenUsage, ToolDefinition,
};
use super::streaming::SseDecoder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Official Google Gemini API endpoint
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: "gemini-2.5-flash".to_string(),
            max_tokens: 8192,
            temperature: 1.0,
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, messages: &[Message], tools: Option<&[ToolDefinition]>) -> GeminiRequest {
        let (system_instruction, contents) = convert_messages(messages);

        let tools = tools.filter(|t| !t.is_empty()).map(|tools| {
            vec![GeminiTools {
                function_declarations: tools
                    .iter()
                    .map(|t| GeminiFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        GeminiRequest {
            contents,
            system_instruction: system_instruction.map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart::text(text)],
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: self.temperature,
                thinking_config: GeminiThinkingConfig {
                    include_thoughts: true,
                },
            },
            tools,
        }
    }

    async fn post(&self, method: &str, request: &GeminiRequest) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/{}:{}", GEMINI_API_BASE, self.model, method);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(LlmError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Gemini API returned an error");
            return Err(LlmError::from_http_status(
                status,
                format!("Gemini API error ({}): {}", status, error_text),
            ));
        }
        Ok(response)
    }
}

/// Split out the system prompt and map the rest to Gemini contents.
///
/// Consecutive tool results are merged into a single `user` turn, as Gemini
/// expects all function responses for one model turn together.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<GeminiContent>) {
    let mut system_instruction: Option<String> = None;
    let mut contents: Vec<GeminiContent> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                if let Some(text) = msg.content.as_text() {
                    match system_instruction.as_mut() {
                        Some(existing) => {
                            existing.push_str("\n\n");
                            existing.push_str(text);
                        }
                        None => system_instruction = Some(text.to_string()),
                    }
                }
            }
            Role::User => contents.push(GeminiContent {
                role: Some("user".to_string()),
                parts: text_parts(&msg.content),
            }),
            Role::Assistant => {
                let parts = msg
                    .content
                    .parts()
                    .into_iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } if !text.is_empty() => {
                            Some(GeminiPart::text(text))
                        }
                        ContentPart::ToolUse {
                            name,
                            input,
                            thought_signature,
                            ..
                        } => Some(GeminiPart {
                            function_call: Some(GeminiFunctionCall { name, args: input }),
                            thought_signature,
                            ..Default::default()
                        }),
                        _ => None,
                    })
                    .collect::<Vec<_>>();
                if !parts.is_empty() {
                    contents.push(GeminiContent {
                        role: Some("model".to_string()),
                        parts,
                    });
                }
            }
            Role::Tool => {
                let parts: Vec<GeminiPart> = msg
                    .content
                    .parts()
                    .into_iter()
                    .filter_map(|part| match part {
                        ContentPart::ToolResult { name, content, .. } => {
                            let output = serde_json::from_str::<serde_json::Value>(&content)
                                .unwrap_or(serde_json::Value::String(content));
                            Some(GeminiPart {
                                function_response: Some(GeminiFunctionResponse {
                                    name,
                                    response: serde_json::json!({ "output": output }),
                                }),
                                ..Default::default()
                            })
                        }
                        _ => None,
                    })
                    .collect();

                let merge = contents.last().is_some_and(|last| {
                    last.role.as_deref() == Some("user")
                        && last.parts.iter().all(|p| p.function_response.is_some())
                });
                match contents.last_mut() {
                    Some(last) if merge => last.parts.extend(parts),
                    _ => contents.push(GeminiContent {
                        role: Some("user".to_string()),
                        parts,
                    }),
                }
            }
        }
    }

    (system_instruction, contents)
}

fn text_parts(content: &MessageContent) -> Vec<GeminiPart> {
    content
        .parts()
        .into_iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(GeminiPart::text(text)),
            _ => None,
        })
        .collect()
}

fn convert_usage(usage: Option<GeminiUsageMetadata>) -> Option<TokenUsage> {
    usage.map(|u| TokenUsage {
        input_tokens: u.prompt_token_count,
        output_tokens: u.candidates_token_count,
        total_tokens: u.total_token_count,
    })
}

/// Turn one response chunk into stream events, in part order
fn chunk_events(chunk: &GeminiStreamChunk) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    let Some(candidate) = chunk.candidates.first() else {
        return events;
    };

    for part in &candidate.content.parts {
        if let Some(call) = &part.function_call {
            let id = format!("call_{}", uuid::Uuid::new_v4().simple());
            events.push(StreamEvent::ToolCallStart {
                id: id.clone(),
                name: call.name.clone(),
                thought_signature: part.thought_signature.clone(),
            });
            events.push(StreamEvent::ToolCallDelta {
                id: id.clone(),
                arguments_delta: call.args.to_string(),
            });
            events.push(StreamEvent::ToolCallComplete { id });
        } else if let Some(text) = part.text.as_ref().filter(|t| !t.is_empty()) {
            if part.thought.unwrap_or(false) {
                events.push(StreamEvent::ThinkingDelta(text.clone()));
            } else {
                events.push(StreamEvent::TextDelta(text.clone()));
            }
        }
    }
    events
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<LlmResponse, LlmError> {
        let request = self.build_request(messages, tools);
        let response = self.post("generateContent", &request).await?;
        let body: GeminiStreamChunk = response
            .json()
            .await
            .map_err(|e| LlmError::Other(anyhow::anyhow!("Failed to parse Gemini response: {}", e)))?;

        let mut builder = StreamingResponseBuilder::new();
        for event in chunk_events(&body) {
            builder.process(&event);
        }
        builder.usage = convert_usage(body.usage_metadata);
        Ok(builder.build())
    }

    async fn chat_streaming(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        callback: StreamCallback,
    ) -> Result<LlmResponse, LlmError> {
        use futures::StreamExt;
        use tokio::time::{timeout, Duration};

        const STREAM_CHUNK_TIMEOUT: Duration = Duration::from_secs(60);

        let request = self.build_request(messages, tools);
        let response = match self.post("streamGenerateContent?alt=sse", &request).await {
            Ok(response) => response,
            Err(e) => {
                callback(StreamEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        let mut builder = StreamingResponseBuilder::new();
        let mut decoder = SseDecoder::new();
        let mut stream = response.bytes_stream();

        loop {
            let chunk = match timeout(STREAM_CHUNK_TIMEOUT, stream.next()).await {
                Ok(Some(chunk)) => chunk.map_err(LlmError::from_network_error)?,
                Ok(None) => break,
                Err(_) => {
                    return Err(LlmError::Network(format!(
                        "Stream timeout - no response from Gemini for {} seconds",
                        STREAM_CHUNK_TIMEOUT.as_secs()
                    )))
                }
            };

            for payload in decoder.push(&chunk) {
                handle_payload(&payload, &mut builder, &callback)?;
            }
        }
        for payload in decoder.finish() {
            handle_payload(&payload, &mut builder, &callback)?;
        }

        callback(StreamEvent::Done);
        Ok(builder.build())
    }
}

fn handle_payload(
    payload: &str,
    builder: &mut StreamingResponseBuilder,
    callback: &StreamCallback,
) -> Result<(), LlmError> {
    if let Ok(error) = serde_json::from_str::<GeminiErrorEnvelope>(payload) {
        let message = format!(
            "Gemini API error ({}): {}",
            error.error.status.unwrap_or_default(),
            error.error.message
        );
        callback(StreamEvent::Error(message.clone()));
        return Err(match error.error.code {
            Some(429) => LlmError::RateLimited(message),
            _ => LlmError::ServiceError(message),
        });
    }

    match serde_json::from_str::<GeminiStreamChunk>(payload) {
        Ok(chunk) => {
            for event in chunk_events(&chunk) {
                builder.process(&event);
                callback(event);
            }
            if let Some(usage) = convert_usage(chunk.usage_metadata) {
                builder.usage = Some(usage);
            }
        }
        Err(e) => tracing::debug!("Skipping unparseable Gemini chunk: {}", e),
    }
    Ok(())
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTools>>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: usize,
    temperature: f32,
    thinking_config: GeminiThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiThinkingConfig {
    include_thoughts: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    code: Option<u16>,
    #[serde(default)]
    message: String,
    status: Option<String>,
}
