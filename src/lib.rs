//! tabiwa-assistant: travel-pass chat assistant
//!
//! - HTTP chat API streaming model output as server-sent events
//! - Agent loop letting the model call two read-only tools: a local
//!   travel-pass catalog search and a web page search
//! - Client side session state, markdown rendering and a terminal chat

pub mod agent;
pub mod catalog;
pub mod config;
pub mod llm;
pub mod protocol;
pub mod tools;
pub mod transport;
pub mod ui;

pub use catalog::Catalog;
pub use config::Config;

/// Package version with a `-dev.<hash>` suffix on untagged builds
pub fn version() -> String {
    format!(
        "{}{}",
        env!("CARGO_PKG_VERSION"),
        env!("TABIWA_VERSION_SUFFIX")
    )
}
