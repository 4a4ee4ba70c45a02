use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::GoogleProviderConfig;
use super::utils::sanitize_function_name;
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};

pub struct GoogleProvider {
    client: Client,
    config: GoogleProviderConfig,
}

impl GoogleProvider {
    pub fn new(config: GoogleProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self { client, config })
    }

    fn build_request_body(&self, messages: &[Message], tools: &[Tool]) -> Value {
        let (system_instruction, contents) = messages_to_gemini_spec(messages);

        let mut body = json!({ "contents": contents });
        if let Some(system) = system_instruction {
            body["systemInstruction"] = system;
        }

        let mut generation_config = Map::new();
        if let Some(temp) = self.config.temperature {
            generation_config.insert("temperature".into(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(tokens));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        if !tools.is_empty() {
            body["tools"] = json!([{ "functionDeclarations": tools_to_gemini_spec(tools) }]);
        }

        body
    }

    async fn post(&self, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.host.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
            }
        }
    }
}

/// Split a message sequence into gemini's system instruction and conversation contents.
///
/// Consecutive tool results are grouped into one content so they answer the
/// function calls of the preceding model turn together.
pub fn messages_to_gemini_spec(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut contents: Vec<Value> = Vec::new();
    let mut pending_responses: Vec<Value> = Vec::new();

    let flush = |pending: &mut Vec<Value>, contents: &mut Vec<Value>| {
        if !pending.is_empty() {
            contents.push(json!({ "role": "user", "parts": std::mem::take(pending) }));
        }
    };

    for message in messages {
        match message {
            Message::Tool { content, name, .. } => {
                pending_responses.push(json!({
                    "functionResponse": {
                        "name": sanitize_function_name(name),
                        "response": tool_content_to_response(content),
                    }
                }));
                continue;
            }
            _ => flush(&mut pending_responses, &mut contents),
        }

        match message {
            Message::System { content } => system_parts.push(json!({ "text": content })),
            Message::User { content } => contents.push(json!({
                "role": "user",
                "parts": [{ "text": content }],
            })),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut parts = Vec::new();
                if !content.is_empty() {
                    parts.push(json!({ "text": content }));
                }
                for call in tool_calls {
                    parts.push(json!({
                        "functionCall": {
                            "name": sanitize_function_name(&call.name),
                            "args": call.arguments,
                        }
                    }));
                }
                // Gemini rejects a content without parts
                if parts.is_empty() {
                    parts.push(json!({ "text": "" }));
                }
                contents.push(json!({ "role": "model", "parts": parts }));
            }
            Message::Tool { .. } => {}
        }
    }
    flush(&mut pending_responses, &mut contents);

    let system_instruction = if system_parts.is_empty() {
        None
    } else {
        Some(json!({ "parts": system_parts }))
    };
    (system_instruction, contents)
}

// Gemini requires the function response to be an object
fn tool_content_to_response(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => json!({ "result": other }),
        Err(_) => json!({ "result": content }),
    }
}

pub fn tools_to_gemini_spec(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": sanitize_function_name(&tool.name),
                "description": tool.description,
                "parameters": tool.parameters,
            })
        })
        .collect()
}

/// Convert a generateContent response to an assistant message
pub fn gemini_response_to_message(response: &Value) -> Result<Message> {
    let parts = response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("No candidates in Gemini response: {}", response))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if let Some(t) = part.get("text").and_then(|t| t.as_str()) {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| anyhow!("Function call without a name: {}", call))?;
            // Gemini does not always assign ids to function calls
            let id = call
                .get("id")
                .and_then(|i| i.as_str())
                .map(String::from)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            tool_calls.push(ToolCall::new(id, name, args));
        }
    }

    Ok(Message::assistant_with_tool_calls(text, tool_calls)?)
}

fn get_usage(data: &Value) -> Usage {
    let metadata = data.get("usageMetadata");
    let count = |key: &str| {
        metadata
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
    };
    Usage::new(
        count("promptTokenCount"),
        count("candidatesTokenCount"),
        count("totalTokenCount"),
    )
}

#[async_trait]
impl Provider for GoogleProvider {
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> Result<(Message, Usage)> {
        let payload = self.build_request_body(messages, tools);

        tracing::debug!(model = %self.config.model, messages = messages.len(), "gemini completion");
        let response = self.post(payload).await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("Gemini API error: {}", error));
        }

        let message = gemini_response_to_message(&response)?;
        Ok((message, get_usage(&response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::GOOGLE_MODEL;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(status: u16, response_body: Value) -> (MockServer, GoogleProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{}:generateContent", GOOGLE_MODEL)))
            .and(header("x-goog-api-key", "test_api_key"))
            .respond_with(ResponseTemplate::new(status).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let provider = GoogleProvider::new(GoogleProviderConfig {
            host: mock_server.uri(),
            api_key: "test_api_key".to_string(),
            model: GOOGLE_MODEL.to_string(),
            temperature: None,
            max_tokens: Some(1024),
        })
        .unwrap();
        (mock_server, provider)
    }

    #[test]
    fn test_messages_to_gemini_spec() {
        let messages = vec![
            Message::system("You are a helpful stock market assistant."),
            Message::user("Compare AAPL and MSFT"),
            Message::assistant("")
                .with_tool_call(ToolCall::new("1", "tavily_search", json!({"query": "AAPL"})))
                .with_tool_call(ToolCall::new("2", "tavily_search", json!({"query": "MSFT"}))),
            Message::tool(r#"{"price":227.52}"#, "1", "tavily_search"),
            Message::tool("\"no data\"", "2", "tavily_search"),
        ];

        let (system, contents) = messages_to_gemini_spec(&messages);
        assert_eq!(
            system.unwrap()["parts"][0]["text"],
            "You are a helpful stock market assistant."
        );
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"],
            json!({"price": 227.52})
        );
        assert_eq!(
            contents[2]["parts"][1]["functionResponse"]["response"],
            json!({"result": "no data"})
        );
    }

    #[test]
    fn test_empty_assistant_message_keeps_a_part() {
        let messages = vec![
            Message::user("Hi"),
            Message::assistant(""),
            Message::user("Are you there?"),
        ];

        let (_, contents) = messages_to_gemini_spec(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1], json!({"role": "model", "parts": [{"text": ""}]}));
    }

    #[test]
    fn test_tool_names_are_sanitized() {
        let tools = tools_to_gemini_spec(&[Tool::new(
            "tavily.search",
            "Search the web",
            json!({"type": "object"}),
        )]);
        assert_eq!(tools[0]["name"], "tavily_search");
    }

    #[test]
    fn test_gemini_response_without_ids() -> Result<()> {
        let response = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"functionCall": {"name": "tavily_search", "args": {"query": "AAPL"}}}]
                }
            }]
        });
        let message = gemini_response_to_message(&response)?;
        let calls = message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "tavily_search");
        assert!(!calls[0].id.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_basic() -> Result<()> {
        let (server, provider) = setup_mock_server(
            200,
            json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "AAPL is at "}, {"text": "$227.52"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 8, "candidatesTokenCount": 5, "totalTokenCount": 13}
            }),
        )
        .await;

        let (message, usage) = provider
            .complete(&[Message::user("What is AAPL trading at?")], &[])
            .await?;
        assert_eq!(message, Message::assistant("AAPL is at $227.52"));
        assert_eq!(usage, Usage::new(Some(8), Some(5), Some(13)));

        let requests = server.received_requests().await.unwrap();
        let sent: Value = serde_json::from_slice(&requests[0].body)?;
        assert_eq!(sent["generationConfig"]["maxOutputTokens"], 1024);
        assert!(sent.get("systemInstruction").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_error_status() {
        let (_, provider) = setup_mock_server(400, json!({"error": {"message": "bad"}})).await;
        let err = provider
            .complete(&[Message::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
