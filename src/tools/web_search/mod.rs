//! `searchWeb`: scrape snippets from the official site or a search engine
//!
//! Failures never escape the tool. Network and parse problems degrade to a
//! fixed fallback payload and are only visible in the server log.

mod fetch;
pub mod html;

pub use fetch::{FetchError, HttpFetcher, PageFetcher};

use super::{query_param, query_schema, Tool, ToolResult};
use crate::config::{WebSearchConfig, WebSearchVariant};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Shown when the page was fetched but no sentence matched
pub const NO_MATCH_CONTENT: &str = "tabiwaは西日本を中心とした観光チケット・フリーパスを販売するWebサービスです。\
     詳細は公式サイトをご確認ください。";

/// Shown when the page could not be fetched at all
pub const FALLBACK_CONTENT: &str = "tabiwaに関する情報を取得中にエラーが発生しました。\
     tabiwa by WESTERは、JR西日本が提供する観光ナビサービスで、\
     北陸、瀬戸内、山陰エリアなどの周遊パスやお得なきっぷを販売しています。\
     詳細は公式サイト（https://www.jr-odekake.net/navi/tabiwa/）をご確認ください。";

pub const FALLBACK_URL: &str = "https://www.jr-odekake.net/navi/tabiwa/";

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebSnippet {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Output of the search-engine variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebSearchResult {
    pub results: Vec<WebSnippet>,
    pub summary: String,
}

/// Output of the official-site variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteDigest {
    pub content: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WebSearchOutput {
    Site(SiteDigest),
    Engine(WebSearchResult),
}

pub struct WebSearchTool {
    fetcher: Arc<dyn PageFetcher>,
    variant: WebSearchVariant,
    site_url: String,
    engine_url: String,
}

impl WebSearchTool {
    pub fn from_config(config: &WebSearchConfig) -> Result<Self, FetchError> {
        Ok(Self::with_fetcher(config, Arc::new(HttpFetcher::new(config)?)))
    }

    pub fn with_fetcher(config: &WebSearchConfig, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            variant: config.variant,
            site_url: config.site_url.clone(),
            engine_url: config.engine_url.clone(),
        }
    }

    /// Run the configured variant; never fails
    pub async fn search(&self, query: &str) -> WebSearchOutput {
        match self.variant {
            WebSearchVariant::Site => WebSearchOutput::Site(self.search_site(query).await),
            WebSearchVariant::Engine => WebSearchOutput::Engine(self.search_engine(query).await),
        }
    }

    async fn search_site(&self, query: &str) -> SiteDigest {
        match self.fetcher.fetch(&self.site_url).await {
            Ok(body) => {
                let text = html::strip_html(&body);
                let content = html::extract_relevant_segments(&text, query)
                    .unwrap_or_else(|| NO_MATCH_CONTENT.to_string());
                tracing::info!(tool = "searchWeb", query, chars = content.chars().count(), "Site digest");
                SiteDigest {
                    content,
                    url: self.site_url.clone(),
                }
            }
            Err(e) => {
                tracing::warn!(tool = "searchWeb", url = %self.site_url, "Web search error: {}", e);
                SiteDigest {
                    content: FALLBACK_CONTENT.to_string(),
                    url: FALLBACK_URL.to_string(),
                }
            }
        }
    }

    fn engine_search_url(&self, query: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        format!("{}{}", self.engine_url, encoded)
    }

    async fn search_engine(&self, query: &str) -> WebSearchResult {
        let search_url = self.engine_search_url(query);
        let results = match self.fetcher.fetch(&search_url).await {
            Ok(body) => html::parse_engine_results(&body),
            Err(e) => {
                tracing::warn!(tool = "searchWeb", url = %search_url, "Web search error: {}", e);
                Vec::new()
            }
        };

        if results.is_empty() {
            return WebSearchResult {
                results: vec![WebSnippet {
                    title: "検索結果を取得できませんでした".to_string(),
                    snippet: format!(
                        "「{}」の検索結果を解析できませんでした。公式サイトをご確認ください。",
                        html::truncate_chars(query, 100)
                    ),
                    url: FALLBACK_URL.to_string(),
                }],
                summary: format!("「{}」の検索結果: 0件", query),
            };
        }

        tracing::info!(tool = "searchWeb", query, count = results.len(), "Engine results");
        WebSearchResult {
            summary: format!("「{}」の検索結果: {}件", query, results.len()),
            results,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "searchWeb"
    }

    fn description(&self) -> &str {
        match self.variant {
            WebSearchVariant::Site => {
                "tabiwaの公式サイトから最新の商品情報を検索します。\
                 商品名、エリア名、観光地名などで検索でき、関連する文章（content）と情報元URL（url）を返します。"
            }
            WebSearchVariant::Engine => {
                "Webを検索して観光チケットに関する最新情報を調べます。\
                 最大5件の結果（title, snippet, url）と要約（summary）を返します。"
            }
        }
    }

    fn parameters(&self) -> Value {
        query_schema("検索キーワード（商品名、エリア名、観光地名など）")
    }

    async fn execute(&self, params: Value) -> Result<ToolResult> {
        let query = match query_param(&params) {
            Ok(query) => query,
            Err(result) => return Ok(result),
        };
        Ok(ToolResult::json(&self.search(query).await))
    }
}
