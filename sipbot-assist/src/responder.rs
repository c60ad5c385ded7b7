//! Reply generation over an OpenAI-compatible `/chat/completions` endpoint

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{Exchange, Responder};
use crate::error::{AssistError, Result};
use crate::SYSTEM_PROMPT;

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

pub struct OpenAiResponder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiResponder {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Persona first, then earlier exchanges oldest first, then the new utterance.
fn build_messages<'a>(utterance: &'a str, history: &'a [Exchange]) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(2 + history.len() * 2);
    messages.push(ChatMessage {
        role: "system",
        content: SYSTEM_PROMPT,
    });
    for exchange in history {
        messages.push(ChatMessage {
            role: "user",
            content: &exchange.user,
        });
        messages.push(ChatMessage {
            role: "assistant",
            content: &exchange.assistant,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: utterance,
    });
    messages
}

#[async_trait]
impl Responder for OpenAiResponder {
    async fn respond(&self, utterance: &str, history: &[Exchange]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: build_messages(utterance, history),
        };
        debug!(
            "Requesting completion from {} ({} prior exchanges)",
            self.model,
            history.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AssistError::from_response(response).await);
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| AssistError::parse(format!("completion body: {}", e)))?;

        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(AssistError::Empty("completion"));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn responder(base: &str) -> OpenAiResponder {
        OpenAiResponder::new("sk-test", base, DEFAULT_CHAT_MODEL, Duration::from_secs(5)).unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        })
    }

    #[test]
    fn test_build_messages_order() {
        let history = vec![Exchange::new("hi there", "Hello!")];
        let messages = build_messages("what time is it", &history);
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[3].content, "what time is it");
    }

    #[tokio::test]
    async fn test_respond_sends_persona_and_utterance() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": DEFAULT_CHAT_MODEL,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": "I need help now" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(" Sure, how can I help? ")))
            .expect(1)
            .mount(&server)
            .await;

        let reply = responder(&server.uri())
            .respond("I need help now", &[])
            .await
            .unwrap();
        assert_eq!(reply, "Sure, how can I help?");
    }

    #[tokio::test]
    async fn test_respond_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        assert!(matches!(
            responder(&server.uri()).respond("hello there", &[]).await,
            Err(AssistError::Empty(_))
        ));
    }

    #[tokio::test]
    async fn test_respond_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&server)
            .await;

        match responder(&server.uri()).respond("hello there", &[]).await {
            Err(AssistError::Api { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream down");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_respond_unreachable() {
        // Nothing listens on port 9 locally
        let result = responder("http://127.0.0.1:9").respond("hello there", &[]).await;
        assert!(matches!(result, Err(AssistError::Http(_))));
    }
}
