//! Web search tool implementation
//!
//! Queries the DuckDuckGo Instant Answer API. It needs no key, but only
//! knows about topics that have an abstract or related topics.

use crate::tools::{Tool, ToolDescription, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;

const DEFAULT_BASE_URL: &str = "https://api.duckduckgo.com";
const DEFAULT_MAX_RESULTS: usize = 8;

/// Web search tool using DuckDuckGo - builtin implementation
pub struct WebSearchTool {
    client: Option<reqwest::Client>,
    base_url: String,
    max_results: usize,
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl WebSearchTool {
    /// Create new web search tool
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `{text, url}` pairs from `RelatedTopics`, descending into
    /// grouped `Topics` (pure function)
    fn collect_related(topics: &[Value], limit: usize, out: &mut Vec<Value>) {
        for topic in topics {
            if out.len() >= limit {
                return;
            }

            if let Some(nested) = topic.get("Topics").and_then(|t| t.as_array()) {
                Self::collect_related(nested, limit, out);
                continue;
            }

            if let (Some(text), Some(url)) = (
                topic.get("Text").and_then(|t| t.as_str()),
                topic.get("FirstURL").and_then(|u| u.as_str()),
            ) {
                out.push(json!({ "text": text, "url": url }));
            }
        }
    }

    /// Shape the API response for the model (pure function)
    fn format_search_response(query: &str, answer: &Value, max_results: usize) -> Value {
        let field = |name: &str| answer.get(name).and_then(|v| v.as_str()).unwrap_or("");

        let mut results = Vec::new();
        if let Some(related) = answer.get("RelatedTopics").and_then(|r| r.as_array()) {
            Self::collect_related(related, max_results, &mut results);
        }

        json!({
            "query": query,
            "heading": field("Heading"),
            "abstract": field("AbstractText"),
            "abstract_url": field("AbstractURL"),
            "answer": field("Answer"),
            "results": results
        })
    }

    /// Validate search parameters (pure function)
    fn validate_search_params(query: Option<&str>) -> Result<&str, String> {
        match query.map(str::trim) {
            Some(q) if !q.is_empty() => Ok(q),
            _ => Err("Query parameter is required".to_string()),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "web_search".to_string(),
            description: "General web search. Do NOT use this tool for questions about Malay \
                          or Malay Jain unless get_malay_info fails."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search query"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    async fn initialize(&mut self, config: Option<&Value>) -> Result<(), ToolError> {
        if let Some(config) = config {
            if let Some(max_results) = config.get("max_results").and_then(|v| v.as_u64()) {
                self.max_results = max_results as usize;
            }
            if let Some(base_url) = config.get("base_url").and_then(|v| v.as_str()) {
                self.base_url = base_url.trim_end_matches('/').to_string();
            }
        }

        self.client = Some(
            reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| ToolError::InitializationError(e.to_string()))?,
        );

        Ok(())
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ToolError::ExecutionError("Tool not initialized".to_string()))?;

        let query = Self::validate_search_params(parameters["query"].as_str())
            .map_err(ToolError::ExecutionError)?;

        info!(query = %query, "Performing web search");
        let response = client
            .get(format!("{}/", self.base_url))
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Search failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionError(format!(
                "Search failed: HTTP {}",
                status.as_u16()
            )));
        }

        // DuckDuckGo labels its JSON as javascript, so parse the text
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Search failed: {e}")))?;
        let answer: Value = serde_json::from_str(&body)
            .map_err(|e| ToolError::ExecutionError(format!("Search failed: {e}")))?;

        Ok(Self::format_search_response(query, &answer, self.max_results))
    }

    async fn shutdown(&mut self) -> Result<(), ToolError> {
        self.client = None;
        Ok(())
    }
}
