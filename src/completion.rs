use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::CompletionError;
use crate::prompt::{Message, Prompt};

/// A chat-completion backend. One attempt per call; callers do not retry.
pub trait CompletionClient {
    fn complete(
        &self,
        prompt: &Prompt,
    ) -> impl Future<Output = Result<String, CompletionError>> + Send;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client (Groq by default).
#[derive(Clone)]
pub struct GroqClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GroqClient {
    pub fn new(config: &Config) -> Result<Self, CompletionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl CompletionClient for GroqClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages: &prompt.messages,
            temperature: self.temperature,
        };

        info!(
            "Sending completion request to {} (model {})",
            self.api_url, self.model
        );

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Completion API returned error status: {}", status);
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| CompletionError::Decode(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(CompletionError::EmptyResponse)?;

        info!("Received {} characters from completion API", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{build_prompt, ResponseFormat};
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn config_for(server: &MockServer) -> Config {
        Config {
            api_key: "test-key".to_string(),
            api_url: format!("{}/openai/v1/chat/completions", server.uri()),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.2,
            response_format: ResponseFormat::Tagged,
            timeout: None,
            uploads_dir: "uploads".into(),
            bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "llama-3.3-70b-versatile",
                "temperature": 0.2
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "<answer>ok</answer>" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GroqClient::new(&config_for(&server)).unwrap();
        let prompt = build_prompt(ResponseFormat::Tagged, "ctx", "q");
        let content = client.complete(&prompt).await.unwrap();
        assert_eq!(content, "<answer>ok</answer>");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&server)
            .await;

        let client = GroqClient::new(&config_for(&server)).unwrap();
        let prompt = build_prompt(ResponseFormat::Bare, "ctx", "q");
        match client.complete(&prompt).await {
            Err(CompletionError::Status { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = GroqClient::new(&config_for(&server)).unwrap();
        let prompt = build_prompt(ResponseFormat::Tagged, "ctx", "q");
        let result = client.complete(&prompt).await;
        assert!(matches!(result, Err(CompletionError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_garbage_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = GroqClient::new(&config_for(&server)).unwrap();
        let prompt = build_prompt(ResponseFormat::Tagged, "ctx", "q");
        let result = client.complete(&prompt).await;
        assert!(matches!(result, Err(CompletionError::Decode(_))));
    }
}
