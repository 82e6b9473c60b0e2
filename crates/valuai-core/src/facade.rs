//! Public entry points.
//!
//! Callers hand over a [`ServiceRegistry`] (usually the one held by their
//! composition root) and never pick adapters themselves. The only routing
//! knob is `RequestOptions::with_provider`, which is stripped before the
//! options reach the adapter.

use std::sync::Arc;

use crate::error::Result;
use crate::provider::types::{ChatMessage, ModelResponse, RequestOptions};
use crate::registry::ServiceRegistry;
use crate::service::AiService;

fn route(registry: &ServiceRegistry, options: RequestOptions) -> (Arc<AiService>, RequestOptions) {
    let (provider, options) = options.take_provider();
    let service = match provider {
        Some(id) => registry.get_service(&id),
        None => registry.get_default_service(),
    };
    (service, options)
}

/// Generate text from a single prompt.
pub async fn generate_text(
    registry: &ServiceRegistry,
    prompt: &str,
    options: RequestOptions,
) -> Result<ModelResponse> {
    let (service, options) = route(registry, options);
    service.generate_text(prompt, &options).await
}

/// Chat completion over caller-supplied messages.
pub async fn generate_chat_completion(
    registry: &ServiceRegistry,
    messages: &[ChatMessage],
    options: RequestOptions,
) -> Result<ModelResponse> {
    let (service, options) = route(registry, options);
    service.generate_chat_completion(messages, &options).await
}

/// Describe a base64-encoded image.
pub async fn process_image(
    registry: &ServiceRegistry,
    image_base64: &str,
    prompt: &str,
    options: RequestOptions,
) -> Result<ModelResponse> {
    let (service, options) = route(registry, options);
    service.process_image(image_base64, prompt, &options).await
}

/// Providers whose credentials are configured.
pub fn list_available_providers(registry: &ServiceRegistry) -> Vec<String> {
    registry.list_available_providers()
}
