//! Provider adapter trait and vendor implementations.
//!
//! Defines the `ProviderAdapter` trait that every upstream vendor must
//! implement. Adapters only translate shapes: they build the vendor payload
//! and normalise the reply into a [`ModelResponse`]. Timeouts, logging and
//! error wrapping belong to [`crate::service::AiService`].
//!
//! Both shipped vendors speak the OpenAI chat-completions protocol, so they
//! share the transport in [`openai_compat`].

pub mod grok;
pub mod openai;
pub mod openai_compat;
pub mod types;

use async_trait::async_trait;
use std::collections::BTreeMap;

use types::{ChatMessage, ModelResponse};

/// Identity of the primary vendor adapter.
pub const OPENAI: &str = "openai";
/// Identity of the Grok (xAI) adapter.
pub const GROK: &str = "grok";

/// Sampling parameters with every service default already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CallParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

/// Contract every vendor backend implements.
///
/// Implementations hold only credentials and configuration, so a single
/// instance is shared by all concurrent callers.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider identity (e.g. `"openai"`).
    fn id(&self) -> &str;

    /// Model used for text and chat calls.
    fn model(&self) -> &str;

    /// Vision-capable model used for image calls.
    fn vision_model(&self) -> &str;

    /// Endpoint the adapter talks to, for the audit trail.
    fn endpoint(&self) -> Option<String> {
        None
    }

    /// Headers sent with each request, for the audit trail. May contain
    /// credentials; the service redacts them before logging.
    fn audit_headers(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Single-prompt text generation.
    async fn complete_text(&self, prompt: &str, params: &CallParams)
        -> anyhow::Result<ModelResponse>;

    /// Chat completion over a caller-owned message list.
    async fn complete_chat(
        &self,
        messages: &[ChatMessage],
        params: &CallParams,
    ) -> anyhow::Result<ModelResponse>;

    /// Describe an image. `image_url` is an `https:` or `data:` URL.
    async fn describe_image(
        &self,
        image_url: &str,
        prompt: &str,
        params: &CallParams,
    ) -> anyhow::Result<ModelResponse>;
}

/// HTTP-level failure reported by a vendor.
#[derive(Debug, thiserror::Error)]
#[error("{provider} API error ({status}): {message}")]
pub struct VendorError {
    pub provider: String,
    pub status: u16,
    pub message: String,
}
