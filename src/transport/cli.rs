//! CLI command implementations

use crate::agent::ChatAgent;
use crate::catalog::{Catalog, TravelPass};
use crate::config::{Config, WebSearchVariant};
use crate::llm;
use crate::tools::{ToolRegistry, WebSearchTool};
use crate::transport::{run_http_server, AppState, ChatClient};
use crate::ui::{run_terminal_chat, ChatBackend};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

fn build_tools(config: &Config) -> Result<Arc<ToolRegistry>> {
    let catalog = Catalog::from_config(&config.catalog).context("Failed to load catalog")?;
    let tools = ToolRegistry::with_defaults(config, Arc::new(catalog))
        .context("Failed to set up tools")?;
    Ok(Arc::new(tools))
}

/// Start the HTTP chat server
pub async fn run_serve(config: Config) -> Result<()> {
    // Missing credentials are reported per request, not at startup
    if let Err(e) = llm::create_provider(&config) {
        tracing::warn!("Model provider unavailable: {}; /api/chat will fail until fixed", e);
    }
    let tools = build_tools(&config)?;
    tracing::info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        tools = ?tools.names(),
        "Starting server"
    );
    run_http_server(AppState::new(config, tools)).await
}

/// Interactive chat against a server, or an in-process agent
pub async fn run_chat(config: Config, url: Option<String>, transcript: Option<PathBuf>) -> Result<()> {
    let backend = match url {
        Some(url) => {
            tracing::info!("Chatting with {}", url);
            ChatBackend::Remote(ChatClient::new(&url))
        }
        None => {
            let provider = llm::create_provider(&config).context("Cannot create model provider")?;
            let agent = ChatAgent::new(Arc::from(provider), build_tools(&config)?)
                .with_max_iterations(config.agent.max_iterations)
                .with_max_history(config.agent.max_history_messages);
            ChatBackend::Local(agent)
        }
    };
    run_terminal_chat(backend, transcript).await
}

#[derive(Tabled)]
struct PassRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Area")]
    area: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Days")]
    valid_days: u32,
}

impl From<&TravelPass> for PassRow {
    fn from(pass: &TravelPass) -> Self {
        Self {
            id: pass.id.clone(),
            name: pass.name.clone(),
            area: pass.area.clone(),
            price: format!("{}円", pass.price),
            valid_days: pass.valid_days,
        }
    }
}

/// Search the catalog and print matches
pub fn run_search(config: &Config, query: &str, format: &str) -> Result<()> {
    let catalog = Catalog::from_config(&config.catalog).context("Failed to load catalog")?;
    let result = catalog.search(query);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            if result.results.is_empty() {
                println!("No travel passes match '{}'", query);
                return Ok(());
            }
            let rows: Vec<PassRow> = result.results.iter().map(PassRow::from).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{}", table);
            println!("{} {}", result.total_count.to_string().bold(), "match(es)".dimmed());
        }
    }
    Ok(())
}

/// Run the web search tool once and print its JSON output
pub async fn run_web_search(
    config: &Config,
    query: &str,
    variant: Option<WebSearchVariant>,
) -> Result<()> {
    let mut web = config.tools.web_search.clone();
    if let Some(variant) = variant {
        web.variant = variant;
    }
    let tool = WebSearchTool::from_config(&web).context("Failed to create HTTP client")?;
    let output = tool.search(query).await;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print the effective configuration as TOML
pub fn run_show_config(config: &Config, path: &Path) -> Result<()> {
    println!("{} {}", "# config file:".dimmed(), path.display());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_row_formats_price() {
        let catalog = Catalog::builtin();
        let pass = catalog.get("hiroshima-wide-pass").unwrap();
        let row = PassRow::from(pass);
        assert_eq!(row.price, "3000円");
        assert_eq!(row.valid_days, 2);
    }

    #[test]
    fn test_build_tools_registers_both() {
        let tools = build_tools(&Config::default()).unwrap();
        assert_eq!(tools.names(), vec!["searchTabiwa", "searchWeb"]);
    }
}
