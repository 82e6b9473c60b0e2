//! Request/response vocabulary shared by every provider adapter.
//!
//! Callers build `RequestOptions` and `ChatMessage`s per call and drop them
//! afterwards. Adapters produce a `ModelResponse`, which is the only thing
//! handed back to callers. None of these types own resources.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{AiError, Result};

/// Upper bound on stop sequences accepted by the OpenAI-compatible vendors.
pub const MAX_STOP_SEQUENCES: usize = 4;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One typed segment of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// An image reachable by URL. Inline images use a `data:` URL.
    ImageRef { url: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::ImageRef { url: url.into() }
    }
}

/// Message body: plain text, or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.trim().is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// Get the content as a string, if it is plain text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Parts(_) => None,
        }
    }

    /// JSON view for audit records. Inline image payloads are summarised
    /// by size so that image bytes never reach the log.
    pub(crate) fn audit_view(&self) -> Value {
        match self {
            MessageContent::Text(text) => Value::String(text.clone()),
            MessageContent::Parts(parts) => Value::Array(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                        ContentPart::ImageRef { url } if url.starts_with("data:") => json!({
                            "type": "image_ref",
                            "inline_bytes": url.len(),
                        }),
                        ContentPart::ImageRef { url } => json!({ "type": "image_ref", "url": url }),
                    })
                    .collect(),
            ),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }
}

/// Reject an empty conversation or one containing empty messages.
pub fn validate_messages(messages: &[ChatMessage]) -> Result<()> {
    if messages.is_empty() {
        return Err(AiError::Validation("message list must not be empty".into()));
    }
    if let Some(index) = messages.iter().position(|m| m.content.is_empty()) {
        return Err(AiError::Validation(format!(
            "message {} has empty content",
            index
        )));
    }
    Ok(())
}

/// Per-call options. Every field is optional; unset fields fall back to
/// the service defaults at dispatch time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    timeout: Option<Duration>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    stop: Vec<String>,
    user_id: Option<String>,
    session_id: Option<String>,
    project_id: Option<String>,
    tags: Vec<String>,
    provider: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
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

    pub fn with_stop<I, S>(mut self, stop: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Route the call to a specific provider. Only honoured by the facade.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn stop(&self) -> &[String] {
        &self.stop
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Split off the provider override, leaving options fit for an adapter.
    pub(crate) fn take_provider(mut self) -> (Option<String>, Self) {
        let provider = self.provider.take();
        (provider, self)
    }

    /// Check the caller-supplied values.
    pub fn validate(&self) -> Result<()> {
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(AiError::Validation("timeout must be positive".into()));
            }
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(AiError::Validation(format!(
                    "temperature {} is outside 0.0..=2.0",
                    t
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(AiError::Validation("max_tokens must be positive".into()));
        }
        if self.stop.len() > MAX_STOP_SEQUENCES {
            return Err(AiError::Validation(format!(
                "at most {} stop sequences are allowed, got {}",
                MAX_STOP_SEQUENCES,
                self.stop.len()
            )));
        }
        Ok(())
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Which provider and model produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Normalized answer from any provider.
///
/// Only ever built from a complete vendor reply; a failed call yields an
/// error instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    text: String,
    usage: Option<Usage>,
    metadata: ResponseMetadata,
}

impl ModelResponse {
    pub fn new(text: impl Into<String>, usage: Option<Usage>, metadata: ResponseMetadata) -> Self {
        Self {
            text: text.into(),
            usage,
            metadata,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    pub fn metadata(&self) -> &ResponseMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are an appraiser.");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content.as_text(), Some("You are an appraiser."));

        let user = ChatMessage::user("Hello");
        assert_eq!(user.role.as_str(), "user");

        let parts = ChatMessage::user_with_parts(vec![
            ContentPart::text("What is this?"),
            ContentPart::image("https://example.com/house.jpg"),
        ]);
        assert!(parts.content.as_text().is_none());
    }

    #[test]
    fn test_parts_serialize_in_order() {
        let msg = ChatMessage::user_with_parts(vec![
            ContentPart::image("https://example.com/a.png"),
            ContentPart::text("first image, then text"),
        ]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0]["type"], "image_ref");
        assert_eq!(value["content"][1]["type"], "text");
    }

    #[test]
    fn test_validate_messages() {
        assert!(matches!(validate_messages(&[]), Err(AiError::Validation(_))));
        assert!(matches!(
            validate_messages(&[ChatMessage::user("  ")]),
            Err(AiError::Validation(_))
        ));
        assert!(validate_messages(&[ChatMessage::user("2+2?")]).is_ok());
    }

    #[test]
    fn test_options_validation() {
        assert!(RequestOptions::new().validate().is_ok());
        assert!(RequestOptions::new()
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(RequestOptions::new()
            .with_temperature(2.5)
            .validate()
            .is_err());
        assert!(RequestOptions::new().with_max_tokens(0).validate().is_err());
        assert!(RequestOptions::new()
            .with_stop(["a", "b", "c", "d", "e"])
            .validate()
            .is_err());
        assert!(RequestOptions::new()
            .with_temperature(0.0)
            .with_timeout(Duration::from_millis(50))
            .validate()
            .is_ok());
    }

    #[test]
    fn test_take_provider_strips_override() {
        let opts = RequestOptions::new().with_provider("grok").with_max_tokens(64);
        let (provider, rest) = opts.take_provider();
        assert_eq!(provider.as_deref(), Some("grok"));
        assert!(rest.provider().is_none());
        assert_eq!(rest.max_tokens(), Some(64));
    }

    #[test]
    fn test_audit_view_hides_inline_images() {
        let content = MessageContent::Parts(vec![
            ContentPart::text("describe"),
            ContentPart::image("data:image/png;base64,iVBORw0KGgo="),
        ]);
        let view = content.audit_view();
        assert_eq!(view[1]["inline_bytes"], 34);
        assert!(!view.to_string().contains("iVBOR"));
    }
}
