//! OpenAI-compatible backend.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any other endpoint that
//! exposes `/chat/completions` with function calling.

use agentry_core::error::BackendError;
use agentry_core::message::{Content, Message, Role, ToolCallRequest};
use agentry_core::provider::{ReasoningBackend, ReasoningRequest, ReasoningResponse, ToolDescriptor, Usage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Transport-level ceiling; the agent loop applies its own per-call budget.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Wait suggested for a 429 that carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Settings read from a component's params.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiCompatSettings {
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}

/// A backend speaking the OpenAI chat completions protocol.
pub struct OpenAiCompatBackend {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
            client,
        })
    }

    /// Build from settings, reading the key from the configured env var.
    ///
    /// A missing key is not an error here: local servers such as Ollama do not
    /// need one, and hosted ones will answer with 401.
    pub fn from_settings(name: impl Into<String>, settings: &OpenAiCompatSettings) -> Result<Self, BackendError> {
        let api_key = std::env::var(&settings.api_key_env).unwrap_or_default();
        let mut backend = Self::new(name, &settings.base_url, api_key, &settings.model)?;
        backend.temperature = settings.temperature;
        backend.max_tokens = settings.max_tokens;
        Ok(backend)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: m.content.as_ref().map(Content::as_text),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.tool_name.clone(),
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn from_api_message(message: ApiResponseMessage) -> Message {
        let content = message.content.filter(|c| !c.is_empty()).map(Content::from);
        let calls: Vec<ToolCallRequest> = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                // Unparseable arguments are passed through as a string; schema
                // validation rejects them and the model sees why.
                let arguments = serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::String(tc.function.arguments));
                ToolCallRequest::new(tc.id, tc.function.name, arguments)
            })
            .collect();

        if calls.is_empty() {
            Message::assistant(content.unwrap_or_else(|| Content::from("")))
        } else {
            Message::assistant_tool_calls(content, calls)
        }
    }

    /// `Retry-After` in delta-seconds form. HTTP dates are not interpreted.
    fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
        headers
            .get(reqwest::header::RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    fn classify_status(status: u16, retry_after: Option<u64>, body: String) -> BackendError {
        match status {
            401 | 403 => BackendError::Authentication("invalid API key or insufficient permissions".into()),
            404 => BackendError::ModelNotFound(body),
            429 => BackendError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            _ => BackendError::Api {
                status_code: status,
                message: body,
            },
        }
    }
}

#[async_trait]
impl ReasoningBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ReasoningRequest) -> Result<ReasoningResponse, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": false,
        });
        if let Some(temperature) = request.temperature.or(self.temperature) {
            body["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(backend = %self.name, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(CLIENT_TIMEOUT.as_secs())
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = Self::retry_after(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            warn!(backend = %self.name, status, body = %error_body, "Backend returned error");
            return Err(Self::classify_status(status, retry_after, error_body));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| BackendError::Api {
            status_code: 200,
            message: format!("failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Api {
                status_code: 200,
                message: "no choices in response".into(),
            })?;

        Ok(ReasoningResponse {
            message: Self::from_api_message(choice.message),
            usage: api_response
                .usage
                .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens)),
            model: api_response.model,
        })
    }
}

// --- Wire types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trailing_slash_is_trimmed() {
        let backend = OpenAiCompatBackend::new("local", "http://localhost:11434/v1/", "", "llama3").unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434/v1");
        assert_eq!(backend.model(), "llama3");
    }

    #[test]
    fn tool_calls_are_serialized_with_string_arguments() {
        let msg = Message::assistant_tool_calls(
            None,
            vec![ToolCallRequest::new("call_1", "echo", json!({"text": "hi"}))],
        );
        let api = OpenAiCompatBackend::to_api_messages(&[msg]);
        let calls = api[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "echo");
        assert_eq!(calls[0].function.arguments, r#"{"text":"hi"}"#);
        assert!(api[0].content.is_none());
    }

    #[test]
    fn tool_result_keeps_call_id() {
        let api = OpenAiCompatBackend::to_api_messages(&[Message::tool_result("call_1", "hi")]);
        assert_eq!(api[0].role, "tool");
        assert_eq!(api[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn response_with_tool_calls_is_parsed() {
        let raw = json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": { "name": "calculator", "arguments": "{\"expression\":\"1+1\"}" }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let choice = parsed.choices.into_iter().next().unwrap();
        let message = OpenAiCompatBackend::from_api_message(choice.message);

        assert!(message.content.is_none());
        assert_eq!(message.tool_calls[0].tool_name, "calculator");
        assert_eq!(message.tool_calls[0].arguments, json!({"expression": "1+1"}));
    }

    #[test]
    fn malformed_arguments_pass_through_as_string() {
        let message = OpenAiCompatBackend::from_api_message(ApiResponseMessage {
            content: Some("thinking".into()),
            tool_calls: Some(vec![ApiToolCall {
                id: "c".into(),
                r#type: "function".into(),
                function: ApiFunction {
                    name: "echo".into(),
                    arguments: "{not json".into(),
                },
            }]),
        });
        assert_eq!(message.tool_calls[0].arguments, json!("{not json"));
        assert_eq!(message.text(), "thinking");
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            OpenAiCompatBackend::classify_status(401, None, String::new()),
            BackendError::Authentication(_)
        ));
        assert!(matches!(
            OpenAiCompatBackend::classify_status(429, None, String::new()),
            BackendError::RateLimited { retry_after_secs: 5 }
        ));
        assert!(matches!(
            OpenAiCompatBackend::classify_status(429, Some(30), String::new()),
            BackendError::RateLimited { retry_after_secs: 30 }
        ));
        let server = OpenAiCompatBackend::classify_status(502, None, "bad gateway".into());
        assert!(server.is_retryable());
        let client = OpenAiCompatBackend::classify_status(400, None, "bad request".into());
        assert!(!client.is_retryable());
    }

    #[test]
    fn retry_after_header_is_read() {
        use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

        let mut headers = HeaderMap::new();
        assert_eq!(OpenAiCompatBackend::retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(OpenAiCompatBackend::retry_after(&headers), Some(12));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(OpenAiCompatBackend::retry_after(&headers), None);
    }

    #[test]
    fn settings_defaults() {
        let settings: OpenAiCompatSettings = serde_json::from_value(json!({"model": "gpt-4o"})).unwrap();
        assert_eq!(settings.base_url, "https://api.openai.com/v1");
        assert_eq!(settings.api_key_env, "OPENAI_API_KEY");
    }
}
