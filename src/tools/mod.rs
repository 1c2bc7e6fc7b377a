//! Lookup tools the model may call
//!
//! - `searchTabiwa`: substring search over the travel-pass catalog
//! - `searchWeb`: scrape the official site or a search engine for snippets

mod catalog_search;
pub mod web_search;

pub use catalog_search::CatalogSearchTool;
pub use web_search::WebSearchTool;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::llm::ToolDefinition;
use anyhow::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }

    /// Successful result carrying a JSON-serialized value
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(output) => Self::success(output),
            Err(e) => Self::error(format!("Failed to serialize tool output: {}", e)),
        }
    }

    /// Output parsed back as JSON, or the raw text as a JSON string
    pub fn output_value(&self) -> Value {
        serde_json::from_str(&self.output).unwrap_or_else(|_| Value::String(self.output.clone()))
    }
}

/// Trait for model-callable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the JSON schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value) -> Result<ToolResult>;

    /// Convert to LLM tool definition
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Schema shared by both tools: a single required `query` string
pub(crate) fn query_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": description
            }
        },
        "required": ["query"]
    })
}

/// Pull the `query` string out of tool input
pub(crate) fn query_param(params: &Value) -> std::result::Result<&str, ToolResult> {
    params
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolResult::error("Missing required parameter: query (string)"))
}

/// Registry of available tools, in registration order
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    tool_timeout_secs: u64,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            tool_timeout_secs: 30,
        }
    }

    /// Registry with `searchTabiwa` and the configured `searchWeb` variant
    pub fn with_defaults(config: &Config, catalog: Arc<Catalog>) -> Result<Self> {
        let mut registry = Self::new();
        // Must outlast the page fetch, so a slow page still ends in the fallback payload
        let fetch_budget = config.tools.web_search.fetch_timeout_secs.saturating_add(1);
        let timeout_secs = config.tools.timeout_secs.max(fetch_budget);
        if timeout_secs != config.tools.timeout_secs {
            tracing::warn!(
                configured = config.tools.timeout_secs,
                effective = timeout_secs,
                "tools.timeout_secs raised above tools.web_search.fetch_timeout_secs"
            );
        }
        registry.set_tool_timeout_secs(timeout_secs);
        registry.register(Arc::new(CatalogSearchTool::new(catalog)));
        registry.register(Arc::new(WebSearchTool::from_config(
            &config.tools.web_search,
        )?));
        Ok(registry)
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    /// Set the default tool timeout (seconds)
    pub fn set_tool_timeout_secs(&mut self, secs: u64) {
        self.tool_timeout_secs = secs;
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Execute a tool by name with given parameters
    ///
    /// Unknown tools, timeouts and panics come back as unsuccessful results.
    pub async fn execute(&self, name: &str, params: Value) -> Result<ToolResult> {
        let Some(tool) = self.get(name) else {
            return Ok(ToolResult::error(format!("Unknown tool: {}", name)));
        };

        let timeout_duration = Duration::from_secs(self.tool_timeout_secs);
        tracing::debug!(tool = name, %params, "Executing tool");

        match timeout(
            timeout_duration,
            AssertUnwindSafe(tool.execute(params)).catch_unwind(),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(panic_info)) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                tracing::error!(tool = name, "Tool panicked: {}", panic_msg);
                Ok(ToolResult::error(format!(
                    "Tool '{}' crashed: {}",
                    name, panic_msg
                )))
            }
            Err(_) => {
                tracing::warn!(tool = name, "Tool timed out after {}s", self.tool_timeout_secs);
                Ok(ToolResult::error(format!(
                    "Tool '{}' timed out after {} seconds",
                    name, self.tool_timeout_secs
                )))
            }
        }
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }
}
