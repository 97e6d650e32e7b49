use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, API_KEY_VAR};
use crate::error::ServiceError;
use crate::lifecycle::{ChatRequest, Completion, CompletionService, TokenUsage};

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct OpenAIErrorEnvelope {
    error: OpenAIErrorBody,
}

#[derive(Deserialize)]
struct OpenAIErrorBody {
    message: String,
}

/// Chat completions client for OpenAI and OpenAI-compatible servers.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAIClient {
    pub fn new(api_key: Option<&str>, base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.map(str::to_string),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_key.as_deref(), &config.base_url, &config.model)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionService for OpenAIClient {
    async fn complete(&self, request: &ChatRequest) -> Result<Completion, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::Authentication(format!("{API_KEY_VAR} is not set")))?;

        let payload = OpenAIRequest {
            model: &self.model,
            messages: vec![
                OpenAIMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                OpenAIMessage {
                    role: "user",
                    content: &request.user_text,
                },
            ],
        };

        info!(
            model = self.model.as_str(),
            messages = payload.messages.len(),
            "Sending request to OpenAI"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ServiceError::Authentication(message)
                }
                _ => ServiceError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        let parsed: OpenAIResponse = serde_json::from_str(&body)
            .map_err(|err| ServiceError::malformed(err.to_string()))?;
        let usage = parsed
            .usage
            .ok_or_else(|| ServiceError::malformed("missing usage"))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::malformed("missing choices[0].message.content"))?;

        debug!(total_tokens = usage.total_tokens, "Received response from OpenAI");
        Ok(Completion { text, usage })
    }
}

/// Pull the human-readable message out of an OpenAI error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<OpenAIErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{any, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL: &str = "gpt-3.5-turbo";

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            system_prompt: "You are a clinical assistant.".to_string(),
            user_text: text.to_string(),
        }
    }

    fn client_for(server: &MockServer, key: Option<&str>) -> OpenAIClient {
        OpenAIClient::new(key, &format!("{}/v1", server.uri()), MODEL)
    }

    #[tokio::test]
    async fn sends_system_then_user_and_parses_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": MODEL,
                "messages": [
                    {"role": "system", "content": "You are a clinical assistant."},
                    {"role": "user", "content": "What is a fever?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-123",
                "object": "chat.completion",
                "model": MODEL,
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "A fever is..."},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let completion = client_for(&server, Some("sk-test"))
            .complete(&request("What is a fever?"))
            .await
            .expect("completion");

        assert_eq!(completion.text, "A fever is...");
        assert_eq!(
            completion.usage,
            TokenUsage {
                prompt_tokens: 12,
                completion_tokens: 8,
                total_tokens: 20,
            }
        );
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .complete(&request("hello"))
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert!(err.to_string().contains(API_KEY_VAR));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("sk-bad"))
            .complete(&request("hello"))
            .await
            .unwrap_err();

        assert!(err.is_auth());
        assert!(err.to_string().contains("Incorrect API key provided"));
    }

    #[tokio::test]
    async fn rate_limit_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "rate limit exceeded", "type": "requests"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("sk-test"))
            .complete(&request("hello"))
            .await
            .unwrap_err();

        match err {
            ServiceError::Api { status, message } => {
                assert_eq!(status, 429);
                assert_eq!(message, "rate limit exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_error_body_is_kept_raw() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway\n"))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("sk-test"))
            .complete(&request("hello"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "service returned 502: Bad Gateway");
    }

    #[tokio::test]
    async fn malformed_bodies_are_rejected() {
        let bodies = [
            ResponseTemplate::new(200).set_body_string("not json"),
            ResponseTemplate::new(200).set_body_json(json!({"choices": []})),
            ResponseTemplate::new(200)
                .set_body_json(json!({"choices": [{"message": {"content": null}}]})),
        ];

        for body in bodies {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(body)
                .mount(&server)
                .await;

            let err = client_for(&server, Some("sk-test"))
                .complete(&request("hello"))
                .await
                .unwrap_err();

            assert!(matches!(err, ServiceError::Malformed(_)), "got {err:?}");
        }
    }

    #[tokio::test]
    async fn answer_without_usage_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("sk-test"))
            .complete(&request("hello"))
            .await
            .unwrap_err();

        match err {
            ServiceError::Malformed(detail) => assert_eq!(detail, "missing usage"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        let client = OpenAIClient::new(Some("sk-test"), "http://127.0.0.1:9/v1", MODEL);

        let err = client.complete(&request("hello")).await.unwrap_err();

        assert!(matches!(err, ServiceError::Network(_)), "got {err:?}");
    }

    #[test]
    fn error_message_prefers_envelope() {
        assert_eq!(
            error_message(r#"{"error":{"message":"quota exhausted"}}"#),
            "quota exhausted"
        );
        assert_eq!(error_message("  "), "empty response body");
        assert_eq!(error_message("upstream timeout"), "upstream timeout");
    }
}
