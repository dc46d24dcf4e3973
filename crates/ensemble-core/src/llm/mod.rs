//! Language model abstraction and an OpenAI-compatible HTTP client.

pub use crate::core_types::{LLMResponse, Message};
use crate::config::LlmConfig;
use crate::core_types::{Role, ToolCall};
use crate::errors::EnsembleError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[async_trait]
pub trait LLM: Send + Sync {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, EnsembleError>;
}

#[derive(Debug, Clone)]
pub struct HttpLLMClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl HttpLLMClient {
    pub fn new(api_base: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        let mut client = Self::new(config.base_url.clone(), config.model.clone())
            .with_temperature(config.temperature);
        if let Some(key) = &config.api_key {
            client = client.with_api_key(key.clone());
        }
        if let Some(max_tokens) = config.max_tokens {
            client = client.with_max_tokens(max_tokens);
        }
        client
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn build_request_body(&self, messages: &[Message], tools: Option<&[ToolMetadata]>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": format_messages(messages),
        });

        if let Some(temp) = self.temperature {
            body["temperature"] = temp.into();
        }

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            let formatted: Vec<Value> = tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.input_schema
                        }
                    })
                })
                .collect();
            body["tools"] = formatted.into();
            body["tool_choice"] = "auto".into();
        }

        body
    }
}

fn format_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            let mut message = json!({
                "role": msg.role.as_str(),
                "content": msg.content
            });

            if msg.role == Role::Tool {
                if let Some(tool_call_id) = &msg.tool_call_id {
                    message["tool_call_id"] = json!(tool_call_id);
                }
            }

            if msg.role == Role::Assistant {
                if let Some(tool_calls) = msg.tool_calls.as_ref().filter(|c| !c.is_empty()) {
                    let formatted: Vec<Value> = tool_calls
                        .iter()
                        .map(|tc| {
                            let id = tc.id.clone().unwrap_or_else(|| {
                                format!("call_{}", uuid::Uuid::new_v4().simple())
                            });
                            json!({
                                "id": id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string()
                                }
                            })
                        })
                        .collect();
                    message["tool_calls"] = json!(formatted);
                }
            }

            message
        })
        .collect()
}

pub(crate) fn parse_response(response: Value) -> Result<LLMResponse, EnsembleError> {
    let choice = response["choices"]
        .as_array()
        .and_then(|choices| choices.first())
        .ok_or_else(|| EnsembleError::ParsingError("No choices in response".to_string()))?;
    let message = &choice["message"];

    let content = message["content"].as_str().map(|s| s.to_string());

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let function = &call["function"];
            let Some(name) = function["name"].as_str() else {
                continue;
            };
            let arguments = match &function["arguments"] {
                Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
                    EnsembleError::ParsingError(format!("Invalid tool call arguments JSON: {}", e))
                })?,
                Value::Null => json!({}),
                other => other.clone(),
            };
            tool_calls.push(ToolCall {
                id: call["id"].as_str().map(str::to_string),
                name: name.to_string(),
                arguments,
            });
        }
    }
    let tool_calls = (!tool_calls.is_empty()).then_some(tool_calls);

    if content.is_none() && tool_calls.is_none() {
        return Err(EnsembleError::ParsingError(
            "Response has neither content nor tool calls".to_string(),
        ));
    }

    Ok(LLMResponse {
        content,
        tool_calls,
        finish_reason: choice["finish_reason"].as_str().map(str::to_string),
        usage: serde_json::from_value(response["usage"].clone()).ok(),
    })
}

#[async_trait]
impl LLM for HttpLLMClient {
    async fn generate(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, EnsembleError> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request_body(&messages, tools.as_deref());

        log::debug!("LLM request to {} with {} messages", url, messages.len());

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EnsembleError::LLMError(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| EnsembleError::LLMError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            let err_msg = format!("API request failed with status {}: {}", status, response_text);
            log::error!("{}", err_msg);
            return Err(EnsembleError::LLMError(err_msg));
        }

        let response_json: Value = serde_json::from_str(&response_text)
            .map_err(|e| EnsembleError::ParsingError(format!("Invalid JSON response: {}", e)))?;

        let parsed = parse_response(response_json)?;
        log::debug!("LLM response content: {:?}", parsed.content);
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_includes_tools_and_settings() {
        let client = HttpLLMClient::new("http://localhost:8080/v1/", "test-model")
            .with_temperature(0.5)
            .with_max_tokens(100);
        assert_eq!(client.api_base, "http://localhost:8080/v1");

        let tools = vec![ToolMetadata {
            name: "text_summarize".to_string(),
            description: "Summarize".to_string(),
            input_schema: json!({"type": "object"}),
        }];
        let body = client.build_request_body(&[Message::user("hi")], Some(tools.as_slice()));

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["tools"][0]["function"]["name"], "text_summarize");
        assert_eq!(body["tool_choice"], "auto");
    }

    #[test]
    fn test_request_body_omits_empty_tools() {
        let client = HttpLLMClient::new("http://localhost", "m");
        let body = client.build_request_body(&[Message::system("s")], Some(&[] as &[ToolMetadata]));
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_parse_text_response() {
        let response = json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        });
        let parsed = parse_response(response).unwrap();
        assert_eq!(parsed.content.as_deref(), Some("Hello"));
        assert_eq!(parsed.finish_reason.as_deref(), Some("stop"));
        assert_eq!(parsed.usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn test_parse_tool_call_response() {
        let response = json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "text_summarize", "arguments": "{\"text\": \"abc\"}"}
                }]
            }}]
        });
        let parsed = parse_response(response).unwrap();
        let calls = parsed.tool_calls.unwrap();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(calls[0].arguments, json!({"text": "abc"}));
    }

    #[test]
    fn test_parse_rejects_empty_choices() {
        assert!(parse_response(json!({"choices": []})).is_err());
        assert!(parse_response(json!({"choices": [{"message": {}}]})).is_err());
    }
}
