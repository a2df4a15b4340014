//! Ollama chat backend.

use crate::advisor::request::AdvisoryRequest;
use crate::advisor::service::AdvisoryService;
use crate::defaults;
use crate::error::{Result, SynchroniaError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Advisory service talking to an Ollama server's `/api/chat`.
#[derive(Debug, Clone)]
pub struct OllamaAdvisor {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaAdvisor {
    /// # Errors
    /// `AdvisoryService` if the HTTP client cannot be built.
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SynchroniaError::AdvisoryService {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    /// Local server with the default model.
    pub fn local() -> Result<Self> {
        Self::new(
            defaults::LLM_ENDPOINT,
            defaults::LLM_MODEL,
            Duration::from_secs(defaults::LLM_TIMEOUT_SECS),
        )
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.endpoint)
    }

    fn request_body(&self, request: &AdvisoryRequest) -> Result<String> {
        let user_prompt = request.user_prompt();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            stream: false,
        };
        serde_json::to_string(&body).map_err(|e| SynchroniaError::AdvisoryService {
            message: format!("Failed to encode chat request: {e}"),
        })
    }
}

/// Extract the advice text from an `/api/chat` response body.
fn parse_chat_response(text: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(text).map_err(|e| SynchroniaError::AdvisoryService {
            message: format!("Failed to parse chat response: {e}"),
        })?;
    let content = response.message.content.trim();
    if content.is_empty() {
        return Err(SynchroniaError::AdvisoryService {
            message: "Chat response was empty".to_string(),
        });
    }
    Ok(content.to_string())
}

#[async_trait::async_trait]
impl AdvisoryService for OllamaAdvisor {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<String> {
        let body = self.request_body(request)?;
        let response = self
            .client
            .post(self.chat_url())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| SynchroniaError::AdvisoryService {
                message: format!("Failed to reach {}: {e}", self.endpoint),
            })?;

        if !response.status().is_success() {
            return Err(SynchroniaError::AdvisoryService {
                message: format!("Chat endpoint returned status {}", response.status()),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| SynchroniaError::AdvisoryService {
                message: format!("Failed to read chat response: {e}"),
            })?;

        parse_chat_response(&text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationTurn;
    use crate::emotion::EmotionLabel;

    fn request() -> AdvisoryRequest {
        let history = vec![ConversationTurn::new("hello", EmotionLabel::Joy)];
        AdvisoryRequest::from_history("make a friend", EmotionLabel::Joy, &history, 50)
    }

    #[test]
    fn test_chat_url_strips_trailing_slash() {
        let advisor =
            OllamaAdvisor::new("http://localhost:11434/", "m", Duration::from_secs(1)).unwrap();
        assert_eq!(advisor.chat_url(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn test_request_body_shape() {
        let advisor = OllamaAdvisor::local().unwrap();
        let body: serde_json::Value =
            serde_json::from_str(&advisor.request_body(&request()).unwrap()).unwrap();

        assert_eq!(body["model"], "deepseek-llm:7b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("make a friend"));
        assert!(user.contains("[JOY] hello"));
    }

    #[test]
    fn test_parse_chat_response() {
        let text = r#"{"model":"m","message":{"role":"assistant","content":"  Ask about their week.  "},"done":true}"#;
        assert_eq!(parse_chat_response(text).unwrap(), "Ask about their week.");
    }

    #[test]
    fn test_parse_rejects_malformed_and_empty() {
        assert!(parse_chat_response("not json").is_err());
        assert!(parse_chat_response(r#"{"message":{"content":"   "}}"#).is_err());
        assert!(parse_chat_response(r#"{"error":"model not found"}"#).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_advisory_error() {
        // Port 9 (discard) is essentially never served over HTTP.
        let advisor =
            OllamaAdvisor::new("http://127.0.0.1:9", "m", Duration::from_millis(500)).unwrap();
        let result = advisor.advise(&request()).await;
        assert!(matches!(result, Err(SynchroniaError::AdvisoryService { .. })));
    }
}
