//! Transport layer: the HTTP chat server, its client, and CLI commands

pub mod cli;
pub mod client;
pub mod http;

pub use client::{ChatClient, TransportError};
pub use http::{router, run_http_server, AppState, ProviderFactory};
