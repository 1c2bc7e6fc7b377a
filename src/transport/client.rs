//! Client for the chat endpoint

use crate::llm::streaming::SseDecoder;
use crate::protocol::{ChatRequest, ChatStreamEvent};
use futures::StreamExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    /// Non-2xx answer; `message` is the body's `error` field when present
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed stream event: {0}")]
    Decode(String),

    #[error("Stream ended before the exchange finished")]
    Truncated,
}

/// Streams chat exchanges from a running server
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ChatClient {
    /// `base_url` like `http://127.0.0.1:8787`
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
        }
    }

    /// Send one request, invoking `on_event` for each event in order.
    ///
    /// Returns once a `done` or `error` event arrives.
    pub async fn send(
        &self,
        request: &ChatRequest,
        mut on_event: impl FnMut(ChatStreamEvent),
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let mut decoder = SseDecoder::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::Request(e.to_string()))?;
            for payload in decoder.push(&chunk) {
                if dispatch(&payload, &mut on_event)? {
                    return Ok(());
                }
            }
        }
        for payload in decoder.finish() {
            if dispatch(&payload, &mut on_event)? {
                return Ok(());
            }
        }
        Err(TransportError::Truncated)
    }
}

/// Decode and deliver one payload; true when the exchange is over
fn dispatch(
    payload: &str,
    on_event: &mut impl FnMut(ChatStreamEvent),
) -> Result<bool, TransportError> {
    let event: ChatStreamEvent =
        serde_json::from_str(payload).map_err(|e| TransportError::Decode(e.to_string()))?;
    let terminal = event.is_terminal();
    on_event(event);
    Ok(terminal)
}

/// The `error` field of a JSON error body, else the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(
            error_message(r#"{"error":"GEMINI_API_KEY not configured"}"#),
            "GEMINI_API_KEY not configured"
        );
        assert_eq!(error_message(" Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn test_dispatch_stops_on_terminal_event() {
        let mut seen = Vec::new();
        let mut record = |e: ChatStreamEvent| seen.push(e);
        assert!(!dispatch(r#"{"type":"start","messageId":"m"}"#, &mut record).unwrap());
        assert!(dispatch(r#"{"type":"done","messageId":"m"}"#, &mut record).unwrap());
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            dispatch("{not json", &mut |_: ChatStreamEvent| {}),
            Err(TransportError::Decode(_))
        ));
    }
}
