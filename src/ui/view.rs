//! HTML rendering of a chat session

use super::markdown::{escape_html, MarkdownRenderer};
use super::session::{ChatMessage, ChatSession, ExchangeState, PartKind, Settlement};
use crate::protocol::ChatRole;
use chrono::{DateTime, Local};

/// Renders messages and whole sessions to HTML fragments
#[derive(Debug, Clone, Default)]
pub struct TranscriptView {
    markdown: MarkdownRenderer,
}

/// `HH:MM` in local time
pub fn time_label(at: &DateTime<Local>) -> String {
    at.format("%H:%M").to_string()
}

impl TranscriptView {
    pub fn new(markdown: MarkdownRenderer) -> Self {
        Self { markdown }
    }

    pub fn render_message(&self, message: &ChatMessage) -> String {
        let role = match message.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        let mut html = format!(
            "<div class=\"message {}\" data-id=\"{}\">",
            role,
            escape_html(&message.id)
        );
        for part in &message.parts {
            match part.kind {
                // Model reasoning is shown verbatim, never as markdown
                PartKind::Thinking => html.push_str(&format!(
                    "<span class=\"thinking\">{}</span>",
                    escape_html(&part.content)
                )),
                PartKind::Text => html.push_str(&format!(
                    "<div class=\"text\">{}</div>",
                    self.markdown.render(&part.content)
                )),
            }
        }
        html.push_str(&format!(
            "<span class=\"time\">{}</span></div>",
            time_label(&message.created_at)
        ));
        html
    }

    /// Every message, then the typing indicator or error line if any
    pub fn render_session(&self, session: &ChatSession) -> String {
        let mut html = String::from("<div class=\"chat\">");
        for message in session.messages() {
            html.push_str(&self.render_message(message));
        }
        if session.shows_typing_indicator() {
            html.push_str("<div class=\"typing\">…</div>");
        }
        if let ExchangeState::Settled(Settlement::Error(message)) = session.state() {
            html.push_str(&format!(
                "<div class=\"error\">{}</div>",
                escape_html(message)
            ));
        }
        html.push_str("</div>");
        html
    }

    /// Standalone HTML page for a saved transcript
    pub fn render_document(&self, session: &ChatSession) -> String {
        format!(
            "<!DOCTYPE html>\n<html lang=\"ja\">\n<head><meta charset=\"utf-8\"><title>Tabiwa Chat</title></head>\n<body>\n{}\n</body>\n</html>\n",
            self.render_session(session)
        )
    }
}
