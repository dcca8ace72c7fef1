//! OpenAI-compatible chat-completions client.
//!
//! Works with any endpoint exposing the `/chat/completions` shape:
//! LM Studio, Ollama, vLLM, OpenRouter, OpenAI itself. The agent loop only
//! needs the output text, so this client resolves
//! `choices[0].message.content` and hands back the string.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use pagemind_core::error::ProviderError;
use pagemind_core::provider::{ChatProvider, ChatRequest};

/// Seconds before an in-flight request is abandoned. The sole timeout in
/// the system.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A chat client for one configured endpoint.
pub struct OpenAiCompatProvider {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a client for a full endpoint URL, with an optional bearer
    /// token. Local endpoints such as LM Studio need no key.
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError> {
        debug!(endpoint = %self.endpoint, model = %request.model, "Sending completion request");

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "Endpoint returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        extract_content(&body)
    }
}

/// Navigate `choices[0].message.content` in a response body.
fn extract_content(body: &str) -> Result<String, ProviderError> {
    let parsed: ApiResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("response is not valid JSON: {e}")))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse("response has no choices".into()))?;

    choice
        .message
        .content
        .ok_or_else(|| ProviderError::MalformedResponse("choices[0].message.content is missing or not a string".into()))
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemind_core::provider::ChatMessage;

    #[test]
    fn content_navigation() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"<think>x</think>{}"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "<think>x</think>{}");
    }

    #[test]
    fn missing_choices_is_malformed() {
        for body in [r#"{"choices":[]}"#, r#"{}"#] {
            assert!(matches!(
                extract_content(body),
                Err(ProviderError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn non_string_content_is_malformed() {
        let body = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert!(matches!(
            extract_content(body),
            Err(ProviderError::MalformedResponse(_))
        ));
        let body = r#"{"choices":[{"message":{}}]}"#;
        assert!(matches!(
            extract_content(body),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            extract_content("not json"),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn request_serializes_messages_in_order() {
        let request = ChatRequest {
            model: "qwen3-30b".into(),
            temperature: 0.7,
            messages: vec![
                ChatMessage::user("{\"phase\":\"thinking\"}"),
                ChatMessage::system("{\"memory\":{}}"),
            ],
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["messages"][0]["role"], "user");
        assert_eq!(parsed["messages"][1]["role"], "system");
    }

    #[test]
    fn provider_constructs_without_key() {
        let provider = OpenAiCompatProvider::new("http://localhost:1234/v1/chat/completions", None);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().name(), "openai_compat");
    }
}
