use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::ToolHandler;
use crate::models::tool::Tool;

pub const TAVILY_HOST: &str = "https://api.tavily.com";
pub const SEARCH_TOOL_NAME: &str = "tavily_search";

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub host: String,
    pub api_key: String,
    pub max_results: u32,
    pub include_answer: bool,
}

impl SearchConfig {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: TAVILY_HOST.to_string(),
            api_key: api_key.into(),
            max_results: 3,
            include_answer: true,
        }
    }
}

/// Web search backed by the Tavily search API
pub struct TavilySearch {
    client: Client,
    config: SearchConfig,
}

impl TavilySearch {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!("{}/search", self.config.host.trim_end_matches('/'));

        let response = self.client.post(&url).json(&payload).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Search request failed: {}\n{}", status, body))
            }
        }
    }
}

#[async_trait]
impl ToolHandler for TavilySearch {
    fn tool(&self) -> Tool {
        Tool::new(
            SEARCH_TOOL_NAME,
            "Search the web for current information such as stock prices, market news and company information.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn invoke(&self, arguments: Value) -> Result<Value> {
        let query = arguments
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| anyhow!("Missing 'query' argument"))?;

        tracing::debug!(query, "running web search");

        self.post(json!({
            "api_key": self.config.api_key,
            "query": query,
            "max_results": self.config.max_results,
            "include_answer": self.config.include_answer,
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(status: u16, body: Value) -> (MockServer, TavilySearch) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(json!({"api_key": "test_key", "max_results": 3})))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&mock_server)
            .await;

        let mut config = SearchConfig::new("test_key");
        config.host = mock_server.uri();
        (mock_server, TavilySearch::new(config).unwrap())
    }

    #[tokio::test]
    async fn test_search_returns_response_json() -> Result<()> {
        let body = json!({
            "query": "AAPL stock price",
            "answer": "Apple trades at $227.52.",
            "results": [{"title": "AAPL", "url": "https://example.com", "content": "..."}]
        });
        let (_server, search) = setup(200, body.clone()).await;

        let result = search.invoke(json!({"query": "AAPL stock price"})).await?;
        assert_eq!(result, body);
        Ok(())
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let (_server, search) = setup(200, json!({})).await;
        let err = search.invoke(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("query"));
    }

    #[tokio::test]
    async fn test_search_surfaces_http_errors() {
        let (_server, search) = setup(401, json!({"detail": "bad key"})).await;
        let err = search.invoke(json!({"query": "MSFT"})).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_definition() {
        let search = TavilySearch::new(SearchConfig::new("k")).unwrap();
        let tool = search.tool();
        assert_eq!(tool.name, SEARCH_TOOL_NAME);
        assert_eq!(tool.parameters["required"], json!(["query"]));
    }
}
