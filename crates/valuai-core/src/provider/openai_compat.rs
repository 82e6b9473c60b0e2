//! Transport for vendors exposing an OpenAI-compatible
//! `/chat/completions` endpoint.
//!
//! Builds the vendor payload, sends it with bearer auth over a shared
//! `reqwest::Client` and normalises the reply. There is no retry loop:
//! one call is one HTTP request.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::types::{
    ChatMessage, ContentPart, MessageContent, ModelResponse, ResponseMetadata, Usage,
};
use super::{CallParams, VendorError};

/// Image detail hint sent alongside image parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Auto,
    High,
}

/// Connection details for one OpenAI-compatible vendor.
#[derive(Clone)]
pub struct CompatTransport {
    provider: String,
    client: Client,
    api_key: Option<String>,
    base_url: String,
    image_detail: ImageDetail,
}

impl CompatTransport {
    /// Create a transport.
    ///
    /// # Arguments
    /// * `provider` - Provider identity, used in errors and metadata
    /// * `api_key` - Bearer credential; `None` makes every call fail fast
    /// * `base_url` - API root, e.g. `https://api.openai.com/v1`
    pub fn new(
        provider: &str,
        api_key: Option<&str>,
        base_url: &str,
        image_detail: ImageDetail,
        client: Client,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        debug!(provider, base_url = %base_url, "Initialized OpenAI-compatible transport");

        Self {
            provider: provider.to_string(),
            client,
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string),
            base_url,
            image_detail,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Headers as they go on the wire.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(key) = &self.api_key {
            headers.insert("Authorization".to_string(), format!("Bearer {}", key));
        }
        headers
    }

    /// Wrap a prompt and an image reference into one multimodal user message.
    pub fn image_message(&self, image_url: &str, prompt: &str) -> ChatMessage {
        ChatMessage::user_with_parts(vec![
            ContentPart::text(prompt),
            ContentPart::image(image_url),
        ])
    }

    /// Send a chat completion request and normalise the reply.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &CallParams,
    ) -> Result<ModelResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .with_context(|| format!("{} API key not configured", self.provider))?;

        let wire_messages: Vec<WireMessage<'_>> = messages
            .iter()
            .map(|m| WireMessage::from_chat(m, self.image_detail))
            .collect();

        let request_body = CompletionRequest {
            model,
            messages: &wire_messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stop: if params.stop.is_empty() {
                None
            } else {
                Some(params.stop.as_slice())
            },
        };

        let url = self.completions_url();
        debug!(
            provider = %self.provider,
            model,
            url = %url,
            msg_count = messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .context("LLM API request failed")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read LLM API response body")?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.message())
                .unwrap_or(body);
            return Err(VendorError {
                provider: self.provider.clone(),
                status: status.as_u16(),
                message,
            }
            .into());
        }

        let completion: CompletionResponse =
            serde_json::from_str(&body).context("Failed to parse LLM API response")?;
        self.normalize(model, completion)
    }

    fn normalize(
        &self,
        requested_model: &str,
        completion: CompletionResponse,
    ) -> Result<ModelResponse> {
        let choice = completion
            .choices
            .into_iter()
            .next()
            .context("LLM API returned no choices")?;

        let text = choice
            .message
            .content
            .context("LLM API returned no content")?;

        let usage = completion.usage.map(|u| {
            let prompt_tokens = u.prompt_tokens.unwrap_or(0);
            let completion_tokens = u.completion_tokens.unwrap_or(0);
            Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: u
                    .total_tokens
                    .unwrap_or(prompt_tokens.saturating_add(completion_tokens)),
            }
        });

        debug!(
            provider = %self.provider,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            tokens = usage.map(|u| u.total_tokens).unwrap_or(0),
            "Received LLM response"
        );

        Ok(ModelResponse::new(
            text,
            usage,
            ResponseMetadata {
                provider: self.provider.clone(),
                model: completion
                    .model
                    .unwrap_or_else(|| requested_model.to_string()),
                finish_reason: choice.finish_reason,
            },
        ))
    }
}

// ── OpenAI API request/response types ───────────────────────────────

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage<'a>],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: WireContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireImageUrl<'a> },
}

#[derive(Serialize)]
struct WireImageUrl<'a> {
    url: &'a str,
    detail: ImageDetail,
}

impl<'a> WireMessage<'a> {
    fn from_chat(message: &'a ChatMessage, detail: ImageDetail) -> Self {
        let content = match &message.content {
            MessageContent::Text(text) => WireContent::Text(text.as_str()),
            MessageContent::Parts(parts) => WireContent::Parts(
                parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => WirePart::Text { text: text.as_str() },
                        ContentPart::ImageRef { url } => WirePart::ImageUrl {
                            image_url: WireImageUrl {
                                url: url.as_str(),
                                detail,
                            },
                        },
                    })
                    .collect(),
            ),
        };
        Self {
            role: message.role.as_str(),
            content,
        }
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageResponse>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[derive(Deserialize, Clone, Copy)]
struct UsageResponse {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorResponse {
    Single(ErrorBody),
    Multiple(Vec<ErrorBody>),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl ErrorResponse {
    fn message(&self) -> String {
        match self {
            Self::Single(b) => b.error.message.clone(),
            Self::Multiple(v) => v
                .first()
                .map(|b| b.error.message.clone())
                .unwrap_or_else(|| "Unknown error".into()),
        }
    }
}
