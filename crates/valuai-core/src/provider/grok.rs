//! Grok adapter, reached through xAI's OpenAI-compatible API.
//!
//! xAI's vision models only accept the `high` image detail hint, and text
//! prompts are sent with a short system preamble so the model answers
//! directly instead of chatting.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;

use super::openai_compat::{CompatTransport, ImageDetail};
use super::types::{ChatMessage, ModelResponse};
use super::{CallParams, ProviderAdapter, GROK};
use crate::config::ProviderEntry;

pub const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
pub const DEFAULT_MODEL: &str = "grok-2-latest";
pub const DEFAULT_VISION_MODEL: &str = "grok-2-vision-latest";

const TEXT_PREAMBLE: &str = "Answer the request directly and concisely.";

pub struct GrokAdapter {
    transport: CompatTransport,
    model: String,
    vision_model: String,
}

impl GrokAdapter {
    pub fn new(entry: &ProviderEntry, client: Client) -> Self {
        let base_url = entry.api_base.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self {
            transport: CompatTransport::new(
                GROK,
                entry.api_key.as_deref(),
                base_url,
                ImageDetail::High,
                client,
            ),
            model: entry.model.clone().unwrap_or_else(|| DEFAULT_MODEL.into()),
            vision_model: entry
                .vision_model
                .clone()
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.into()),
        }
    }

    fn text_messages(prompt: &str) -> [ChatMessage; 2] {
        [ChatMessage::system(TEXT_PREAMBLE), ChatMessage::user(prompt)]
    }
}

#[async_trait]
impl ProviderAdapter for GrokAdapter {
    fn id(&self) -> &str {
        GROK
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn vision_model(&self) -> &str {
        &self.vision_model
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.transport.completions_url())
    }

    fn audit_headers(&self) -> BTreeMap<String, String> {
        self.transport.headers()
    }

    async fn complete_text(&self, prompt: &str, params: &CallParams) -> Result<ModelResponse> {
        self.transport
            .chat(&self.model, &Self::text_messages(prompt), params)
            .await
    }

    async fn complete_chat(
        &self,
        messages: &[ChatMessage],
        params: &CallParams,
    ) -> Result<ModelResponse> {
        self.transport.chat(&self.model, messages, params).await
    }

    async fn describe_image(
        &self,
        image_url: &str,
        prompt: &str,
        params: &CallParams,
    ) -> Result<ModelResponse> {
        let message = self.transport.image_message(image_url, prompt);
        self.transport
            .chat(&self.vision_model, &[message], params)
            .await
    }
}
