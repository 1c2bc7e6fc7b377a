//! Line-based chat in the terminal
//!
//! Drives a [`ChatSession`] from stdin. A line ending in `\` continues on the
//! next line, the same as Shift+Enter in a browser input.

use super::session::{ChatSession, ExchangeState, Key, KeyEvent, KeyOutcome, Settlement};
use super::view::TranscriptView;
use crate::agent::{AgentError, ChatAgent};
use crate::protocol::{ChatFailure, ChatRequest, ChatStreamEvent};
use crate::transport::ChatClient;
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Where exchanges are answered
pub enum ChatBackend {
    /// A running `tabiwa serve`
    Remote(ChatClient),
    /// An agent in this process
    Local(ChatAgent),
}

impl ChatBackend {
    /// Run one exchange, applying every event to `session` as it arrives
    pub async fn exchange(
        &self,
        session: &mut ChatSession,
        request: ChatRequest,
        mut on_event: impl FnMut(&ChatStreamEvent),
    ) {
        match self {
            ChatBackend::Remote(client) => {
                let result = client
                    .send(&request, |event| {
                        on_event(&event);
                        session.apply(&event);
                    })
                    .await;
                if let Err(e) = result {
                    tracing::warn!("Chat request failed: {}", e);
                    session.fail(e.to_string());
                }
            }
            ChatBackend::Local(agent) => {
                let (tx, mut rx) = mpsc::channel(64);
                let run = agent.run(request.to_llm_messages(), tx);
                let consume = async {
                    while let Some(event) = rx.recv().await {
                        on_event(&event);
                        session.apply(&event);
                    }
                };
                let (result, ()) = tokio::join!(run, consume);
                match result {
                    Ok(_) => {}
                    Err(AgentError::Llm(e)) => session.fail(ChatFailure::classify(&e).message()),
                    Err(e) => session.fail(e.to_string()),
                }
            }
        }
    }
}

fn print_event(event: &ChatStreamEvent) {
    match event {
        ChatStreamEvent::ThinkingDelta { delta, .. } => print!("{}", delta.dimmed()),
        ChatStreamEvent::TextDelta { delta, .. } => print!("{}", delta),
        ChatStreamEvent::ToolCall {
            tool_name, input, ..
        } => println!("\n{}", format!("[{} {}]", tool_name, input).cyan()),
        ChatStreamEvent::Done { .. } => println!("\n"),
        ChatStreamEvent::Start { .. }
        | ChatStreamEvent::ToolResult { .. }
        | ChatStreamEvent::Error { .. } => {}
    }
    let _ = io::stdout().flush();
}

/// Feed one typed line into the session, as key presses
fn type_line(session: &mut ChatSession, line: &str) -> KeyOutcome {
    let (text, continued) = match line.strip_suffix('\\') {
        Some(text) => (text, true),
        None => (line, false),
    };
    for c in text.chars() {
        session.handle_key(KeyEvent::plain(Key::Char(c)));
    }
    session.handle_key(KeyEvent {
        key: Key::Enter,
        shift: continued,
        composing: false,
    })
}

/// Interactive loop until `exit`, `quit`, or end of input
pub async fn run_terminal_chat(backend: ChatBackend, transcript: Option<PathBuf>) -> Result<()> {
    println!("{}", "=== Tabiwa チケット相談 ===".bold().cyan());
    println!("Type 'exit' or 'quit' to exit, 'clear' to start over\n");

    let mut session =
        ChatSession::new().with_conversation_id(uuid::Uuid::new_v4().to_string());
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        let prompt = if session.input().is_empty() { "> " } else { ". " };
        print!("{}", prompt);
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);

        if session.input().is_empty() {
            match line.trim().to_lowercase().as_str() {
                "" => continue,
                "exit" | "quit" => break,
                "clear" => {
                    session.reset();
                    println!("Conversation cleared.\n");
                    continue;
                }
                _ => {}
            }
        }

        if let KeyOutcome::Submitted(request) = type_line(&mut session, line) {
            println!();
            backend.exchange(&mut session, request, print_event).await;
            if let ExchangeState::Settled(Settlement::Error(message)) = session.state() {
                eprintln!("{} {}\n", "Error:".red().bold(), message);
            }
        }
    }

    if let Some(path) = transcript {
        let html = TranscriptView::default().render_document(&session);
        std::fs::write(&path, html)
            .with_context(|| format!("Failed to write transcript to {}", path.display()))?;
        println!("Transcript saved to {}", path.display());
    }
    println!("Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::llm::{LlmProvider, ScriptedProvider, ScriptedTurn};
    use crate::tools::ToolRegistry;
    use std::sync::Arc;

    fn local(provider: ScriptedProvider) -> ChatBackend {
        let tools =
            ToolRegistry::with_defaults(&Config::default(), Arc::new(Catalog::builtin())).unwrap();
        let provider: Arc<dyn LlmProvider> = Arc::new(provider);
        ChatBackend::Local(ChatAgent::new(provider, Arc::new(tools)))
    }

    #[test]
    fn test_type_line_continuation() {
        let mut session = ChatSession::new();
        assert_eq!(type_line(&mut session, "広島\\"), KeyOutcome::Edited);
        assert_eq!(session.input(), "広島\n");
        match type_line(&mut session, "2日間") {
            KeyOutcome::Submitted(request) => {
                assert_eq!(request.messages[0].joined_text(), "広島\n2日間")
            }
            other => panic!("expected submission, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_local_exchange_settles_with_answer() {
        let backend = local(ScriptedProvider::catalog_demo());
        let mut session = ChatSession::new();
        session.set_input("広島");
        let request = session.submit().unwrap();

        let mut kinds = Vec::new();
        backend
            .exchange(&mut session, request, |event| {
                kinds.push(serde_json::to_value(event).unwrap()["type"].clone())
            })
            .await;

        assert_eq!(session.state(), &ExchangeState::Settled(Settlement::Success));
        assert!(session.messages()[1].displayed_text().contains("広島ワイドパス"));
        assert_eq!(kinds.first(), Some(&serde_json::json!("start")));
        assert_eq!(kinds.last(), Some(&serde_json::json!("done")));
        assert!(kinds.contains(&serde_json::json!("tool-call")));
    }

    #[tokio::test]
    async fn test_local_failure_before_stream() {
        let backend = local(ScriptedProvider::new(vec![ScriptedTurn::Fail {
            status: 500,
            message: "RESOURCE_EXHAUSTED".into(),
        }]));
        let mut session = ChatSession::new();
        session.set_input("広島");
        let request = session.submit().unwrap();
        backend.exchange(&mut session, request, |_| {}).await;
        assert_eq!(
            session.state(),
            &ExchangeState::Settled(Settlement::Error(
                crate::protocol::RATE_LIMIT_MESSAGE.to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_remote_unreachable_settles_with_error() {
        let backend = ChatBackend::Remote(ChatClient::new("http://127.0.0.1:9"));
        let mut session = ChatSession::new();
        session.set_input("広島");
        let request = session.submit().unwrap();
        backend.exchange(&mut session, request, |_| {}).await;
        assert!(matches!(
            session.state(),
            ExchangeState::Settled(Settlement::Error(_))
        ));
    }
}
