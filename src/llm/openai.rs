// SPDX-License-Identifier: MIT

//! OpenAI chat-completions client.

use super::{ChatModel, GenerationConfig, Message, Role, ToolCall, ToolSpec};
use crate::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::env;

/// Client for the OpenAI chat-completions API (or any compatible endpoint).
pub struct OpenAiModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAiModel {
    /// Create a new OpenAiModel.
    ///
    /// Requires `OPENAI_API_KEY` to be set. `OPENAI_BASE_URL` overrides the
    /// default endpoint for compatible providers.
    pub fn new(model_name: impl Into<String>) -> Result<Self, ModelError> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("OpenAI".to_string()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name: model_name.into(),
            base_url,
        })
    }

    /// Convert an internal message to the OpenAI wire format.
    fn message_to_wire(message: &Message) -> serde_json::Value {
        match message.role {
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                "content": message.content,
            }),
            Role::Assistant if message.has_tool_calls() => {
                let tool_calls: Vec<serde_json::Value> = message
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": serde_json::to_string(&tc.arguments)
                                    .unwrap_or_default(),
                            }
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": if message.content.is_empty() {
                        serde_json::Value::Null
                    } else {
                        json!(message.content)
                    },
                    "tool_calls": tool_calls,
                })
            }
            Role::System => json!({ "role": "system", "content": message.content }),
            Role::User => json!({ "role": "user", "content": message.content }),
            Role::Assistant => json!({ "role": "assistant", "content": message.content }),
        }
    }

    fn tools_to_wire(tools: &[ToolSpec]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect()
    }

    /// Parse a chat-completions response body into a message.
    fn parse_response(response: &serde_json::Value) -> Result<Message, ModelError> {
        let message = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .map(|c| &c["message"])
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".to_string()))?;

        let content = message["content"].as_str().unwrap_or_default().to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for tc in calls {
                let id = match tc["id"].as_str() {
                    Some(id) => id.to_string(),
                    None => format!("call_{}", uuid::Uuid::new_v4()),
                };
                let name = tc["function"]["name"].as_str().unwrap_or_default().to_string();
                let args_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
                let arguments: serde_json::Value =
                    serde_json::from_str(args_str).unwrap_or(json!({}));

                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments,
                });
            }
        }

        Ok(Message::assistant_with_calls(content, tool_calls))
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    async fn invoke(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tools: &[ToolSpec],
    ) -> Result<Message, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);

        let wire_messages: Vec<serde_json::Value> =
            messages.iter().map(Self::message_to_wire).collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": wire_messages,
        });

        if let Some(temp) = config.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = config.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        if !tools.is_empty() {
            body["tools"] = json!(Self::tools_to_wire(tools));
            body["tool_choice"] = json!("auto");
        }

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                provider: "OpenAI".to_string(),
                message,
            });
        }

        let resp_json: serde_json::Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_response(&resp_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_message_to_wire() {
        let msg = OpenAiModel::message_to_wire(&Message::user("Hello"));
        assert_eq!(msg["role"], "user");
        assert_eq!(msg["content"], "Hello");
    }

    #[test]
    fn test_tool_result_to_wire_pairs_invocation_id() {
        let msg = OpenAiModel::message_to_wire(&Message::tool("call_9", "sunny"));
        assert_eq!(msg["role"], "tool");
        assert_eq!(msg["tool_call_id"], "call_9");
        assert_eq!(msg["content"], "sunny");
    }

    #[test]
    fn test_assistant_with_calls_to_wire() {
        let msg = OpenAiModel::message_to_wire(&Message::assistant_with_calls(
            "",
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "search".to_string(),
                arguments: json!({"query": "rust"}),
            }],
        ));
        assert_eq!(msg["role"], "assistant");
        assert!(msg["content"].is_null());
        assert_eq!(msg["tool_calls"][0]["function"]["name"], "search");
        assert_eq!(msg["tool_calls"][0]["id"], "call_1");
    }

    #[test]
    fn test_parse_text_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Hello, how can I help?"
                }
            }]
        });

        let message = OpenAiModel::parse_response(&response).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "Hello, how can I help?");
        assert!(!message.has_tool_calls());
    }

    #[test]
    fn test_parse_tool_call_response() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "get_weather",
                            "arguments": "{\"city\": \"London\"}"
                        }
                    }]
                }
            }]
        });

        let message = OpenAiModel::parse_response(&response).unwrap();
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].id, "call_123");
        assert_eq!(message.tool_calls[0].name, "get_weather");
        assert_eq!(message.tool_calls[0].arguments["city"], "London");
    }

    #[test]
    fn test_parse_response_without_choices_is_invalid() {
        let response = json!({"error": "overloaded"});
        assert!(OpenAiModel::parse_response(&response).is_err());
    }
}
