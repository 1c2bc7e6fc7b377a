//! `searchTabiwa`: catalog lookup exposed to the model

use super::{query_param, query_schema, Tool, ToolResult};
use crate::catalog::Catalog;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct CatalogSearchTool {
    catalog: Arc<Catalog>,
}

impl CatalogSearchTool {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for CatalogSearchTool {
    fn name(&self) -> &str {
        "searchTabiwa"
    }

    fn description(&self) -> &str {
        "tabiwaで販売している観光チケット・フリーパスを検索します。\
         エリア名、観光地名、キーワードで検索でき、料金・有効日数・特典・購入URLを返します。"
    }

    fn parameters(&self) -> Value {
        query_schema("検索キーワード（例: 広島、関西、新幹線）")
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let query = match query_param(&params) {
            Ok(query) => query,
            Err(result) => return Ok(result),
        };

        let result = self.catalog.search(query);
        tracing::info!(tool = "searchTabiwa", query, matches = result.total_count, "Catalog search");
        Ok(ToolResult::json(&result))
    }
}
