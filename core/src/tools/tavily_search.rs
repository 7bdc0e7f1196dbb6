//! Web search backed by the Tavily API.

use crate::tools::{
    extract_bool_arg_opt, extract_string_arg, extract_string_arg_opt, extract_usize_arg_opt,
};
use crate::traits::{ArgumentSchema, ParamSpec, Tool};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const TAVILY_BASE_URL: &str = "https://api.tavily.com";
const DEFAULT_SEARCH_DEPTH: &str = "basic";
const DEFAULT_MAX_RESULTS: usize = 5;
const DEFAULT_INCLUDE_ANSWER: bool = true;
const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TavilyResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<TavilyResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TavilyResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

pub struct TavilySearchTool {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl TavilySearchTool {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: TAVILY_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn name(&self) -> &str {
        "tavily_search"
    }

    fn description(&self) -> &str {
        "Search the web for real-time, up-to-date information using Tavily's AI-optimized \
         search engine. Use this for current events, recent news, live data, or any \
         information that changes over time."
    }

    fn schema(&self) -> ArgumentSchema {
        ArgumentSchema::new(vec![
            ParamSpec::string(
                "query",
                "The search query. Be specific and clear. Examples: 'latest SpaceX launch \
                 date', 'current Bitcoin price'",
            )
            .required(),
            ParamSpec::one_of(
                "search_depth",
                "Search depth: 'basic' for quick results, 'advanced' for more thorough and \
                 relevant results. Default: 'basic'",
                &["basic", "advanced"],
            )
            .with_default(json!(DEFAULT_SEARCH_DEPTH)),
            ParamSpec::integer(
                "max_results",
                "Number of search results to return (1-10). Default: 5",
                Some(1),
                Some(10),
            )
            .with_default(json!(DEFAULT_MAX_RESULTS)),
            ParamSpec::boolean(
                "include_answer",
                "Whether to include an AI-generated summary answer. Default: true",
            )
            .with_default(json!(DEFAULT_INCLUDE_ANSWER)),
        ])
    }

    async fn execute(&self, args: serde_json::Value) -> Result<String> {
        let query = extract_string_arg(&args, "query")?;
        let search_depth = extract_string_arg_opt(&args, "search_depth", DEFAULT_SEARCH_DEPTH);
        let max_results = extract_usize_arg_opt(&args, "max_results", DEFAULT_MAX_RESULTS);
        let include_answer = extract_bool_arg_opt(&args, "include_answer", DEFAULT_INCLUDE_ANSWER);

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("TAVILY_API_KEY is not set"))?;

        debug!(%query, %search_depth, max_results, "tavily search");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(api_key)
            .json(&TavilyRequest {
                query: &query,
                search_depth: &search_depth,
                max_results,
                include_answer,
            })
            .send()
            .await
            .context("Tavily request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Tavily API error {}: {}", status, error_text));
        }

        let body: TavilyResponse = response
            .json()
            .await
            .context("Failed to decode Tavily response")?;

        Ok(format_results(&query, &body, include_answer, max_results))
    }
}

pub fn format_results(
    query: &str,
    response: &TavilyResponse,
    include_answer: bool,
    max_results: usize,
) -> String {
    let mut parts = Vec::new();

    if include_answer
        && let Some(answer) = response.answer.as_deref().filter(|a| !a.trim().is_empty())
    {
        parts.push(format!("**AI Summary:** {}\n", answer));
    }

    if !response.results.is_empty() {
        parts.push("**Sources:**".to_string());
        for (idx, item) in response.results.iter().take(max_results).enumerate() {
            let title = item.title.as_deref().unwrap_or("No title");
            let snippet: String = item.content.chars().take(SNIPPET_MAX_CHARS).collect();
            parts.push(format!("{}. [{}]({})", idx + 1, title, item.url));
            parts.push(format!("   {}...", snippet));
        }
    }

    if parts.is_empty() {
        return format!("No results found for: {}", query);
    }

    parts.join("\n")
}
