use crate::config::{DEFAULT_GENERATION_TIMEOUT_SECS, DEFAULT_OPENAI_API_BASE, DEFAULT_OPENAI_MODEL};
use crate::consts::{FALLBACK_REPLY, HISTORY_TURNS, MAX_REPLY_TOKENS, REPLY_TEMPERATURE, SYSTEM_PROMPT};
use crate::error::AppError;
use crate::openai_types::{OpenAIBatchResponse, OpenAIMessage, OpenAIPayload};
use crate::store::ConversationTurn;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error};

/// Produces the next thing to say to a caller.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Always returns something speakable; failures are replaced by a fixed apology.
    async fn reply(&self, utterance: &str, history: &[ConversationTurn]) -> String;
}

/// Prompt for a completion: the system instruction, then at most [`HISTORY_TURNS`] prior turns
/// as user/assistant pairs (most recent last), then the new utterance.
pub fn build_messages(utterance: &str, history: &[ConversationTurn]) -> Vec<OpenAIMessage> {
    let recent = &history[history.len().saturating_sub(HISTORY_TURNS)..];
    let mut conversation = Vec::with_capacity(2 + recent.len() * 2);
    conversation.push(OpenAIMessage::system(SYSTEM_PROMPT));
    for turn in recent {
        conversation.push(OpenAIMessage::user(&turn.message));
        conversation.push(OpenAIMessage::assistant(&turn.response));
    }
    conversation.push(OpenAIMessage::user(utterance));
    conversation
}

/// Chat-completions backed [`Responder`].
pub struct OpenAIResponder {
    http_client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    timeout: Duration,
}

impl OpenAIResponder {
    pub fn new(http_client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn complete(&self, messages: Vec<OpenAIMessage>) -> Result<String, AppError> {
        let url = format!("{}/chat/completions", self.api_base);
        let key = self.api_key.as_str();
        let payload = OpenAIPayload {
            model: self.model.clone(),
            messages,
            max_tokens: Some(MAX_REPLY_TOKENS),
            temperature: Some(REPLY_TEMPERATURE),
        };
        let resp = self
            .http_client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {key}"))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| AppError::Generation(format!("request failed: {e}")))?;
        let resp = resp
            .json::<OpenAIBatchResponse>()
            .await
            .map_err(|e| AppError::Generation(format!("unreadable response: {e}")))?;
        if let Some(usage) = &resp.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "openai usage"
            );
        }
        let content = resp
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(AppError::Generation("empty completion".to_string()));
        }

        Ok(content)
    }
}

#[async_trait]
impl Responder for OpenAIResponder {
    async fn reply(&self, utterance: &str, history: &[ConversationTurn]) -> String {
        let messages = build_messages(utterance, history);
        debug!(conversation=?messages, "sending conversation to openai");
        match self.complete(messages).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error=%e, "failed to get reply from OpenAI");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn history(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| {
                ConversationTurn::new(
                    datetime!(2024-03-07 10:00 UTC),
                    format!("question {i}"),
                    format!("answer {i}"),
                )
            })
            .collect()
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-3.5-turbo",
            "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25},
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {"role": "assistant", "content": content}
            }]
        })
    }

    fn responder(server: &MockServer) -> OpenAIResponder {
        OpenAIResponder::new(reqwest::Client::new(), "sk-test")
            .with_api_base(server.uri())
            .with_timeout(Duration::from_millis(500))
    }

    #[test]
    fn prompt_starts_with_system_and_ends_with_utterance() {
        let messages = build_messages("what time is it", &history(2));
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1], OpenAIMessage::user("question 0"));
        assert_eq!(messages[2], OpenAIMessage::assistant("answer 0"));
        assert_eq!(messages[5], OpenAIMessage::user("what time is it"));
    }

    #[test]
    fn prompt_keeps_only_the_five_latest_turns() {
        let messages = build_messages("next", &history(9));
        // system + 5 pairs + utterance
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[1].content, "question 4");
        assert_eq!(messages[10].content, "answer 8");
    }

    #[tokio::test]
    async fn returns_completion_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 150,
                "temperature": 0.7
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  It is noon.  ")))
            .expect(1)
            .mount(&server)
            .await;

        let reply = responder(&server).reply("what time is it", &[]).await;
        assert_eq!(reply, "It is noon.");
    }

    #[tokio::test]
    async fn api_error_yields_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let reply = responder(&server).reply("hello", &[]).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn malformed_or_empty_response_yields_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"nope\": true}"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("   ")))
            .mount(&server)
            .await;

        let responder = responder(&server);
        assert_eq!(responder.reply("hello", &[]).await, FALLBACK_REPLY);
        assert_eq!(responder.reply("hello", &[]).await, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn slow_api_times_out_into_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("too late"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let reply = responder(&server).reply("hello", &[]).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn unreachable_api_yields_fallback() {
        let responder = OpenAIResponder::new(reqwest::Client::new(), "sk-test")
            .with_api_base("http://127.0.0.1:9")
            .with_timeout(Duration::from_millis(500));
        assert_eq!(responder.reply("hello", &[]).await, FALLBACK_REPLY);
    }
}
