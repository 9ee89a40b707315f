// SPDX-License-Identifier: MIT

use crate::error::EngineError;
use crate::tools::Tool;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};

static WEB_SEARCH_PARAMS: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "The search query"
            }
        },
        "required": ["query"]
    })
});

#[derive(Debug, Deserialize)]
struct WebSearchArgs {
    query: String,
}

/// Placeholder web search used by the conversational demo. Returns a canned
/// result instead of hitting a real search API.
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Call to surf the web."
    }

    fn parameters(&self) -> &Value {
        &WEB_SEARCH_PARAMS
    }

    async fn execute(&self, arguments: Value) -> Result<String, EngineError> {
        let args: WebSearchArgs = serde_json::from_value(arguments)?;
        log::info!("Searching for: {}", args.query);
        Ok(format!(
            "I looked up: {}. Result: It's sunny in San Francisco, but you better look out if you're a Gemini.",
            args.query
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_echoes_query() {
        let result = WebSearchTool
            .execute(json!({"query": "weather in san francisco"}))
            .await
            .unwrap();
        assert!(result.contains("weather in san francisco"));
    }

    #[tokio::test]
    async fn test_search_rejects_missing_query() {
        let result = WebSearchTool.execute(json!({})).await;
        assert!(result.is_err());
    }
}
