//! Client-side chat: session state, markdown, HTML view, terminal front-end

pub mod markdown;
mod session;
pub mod terminal;
mod view;

pub use markdown::{render_markdown, MarkdownPass, MarkdownRenderer, NodeKind, RenderTable};
pub use session::{
    ChatMessage, ChatSession, ExchangeState, Key, KeyEvent, KeyOutcome, MessagePart, PartKind,
    Settlement,
};
pub use terminal::{run_terminal_chat, ChatBackend};
pub use view::{time_label, TranscriptView};
