//! Chat agent with tool execution

mod chat;
mod context;
pub mod prompt;

pub use chat::{AgentError, AgentResponse, ChatAgent, ToolCallLog};
pub use context::ConversationContext;
