//! End-to-end tests of the facade against in-process adapters.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use valuai_core::audit::MemoryAuditSink;
use valuai_core::config::AiConfig;
use valuai_core::diagnostics::{CollectingDiagnostics, Diagnostic};
use valuai_core::facade;
use valuai_core::provider::{CallParams, ProviderAdapter};
use valuai_core::redact::REDACTED;
use valuai_core::{
    AiError, ChatMessage, ModelResponse, ProviderDescriptor, RequestOptions, ResponseMetadata,
    ServiceRegistry, Usage,
};

/// Answers arithmetic with a fixed vendor payload.
struct EchoAdapter {
    id: &'static str,
    api_key: Option<String>,
}

impl EchoAdapter {
    fn reply(&self, text: &str) -> ModelResponse {
        ModelResponse::new(
            text,
            Some(Usage {
                prompt_tokens: 9,
                completion_tokens: 1,
                total_tokens: 10,
            }),
            ResponseMetadata {
                provider: self.id.to_string(),
                model: format!("{}-chat", self.id),
                finish_reason: Some("stop".into()),
            },
        )
    }
}

#[async_trait]
impl ProviderAdapter for EchoAdapter {
    fn id(&self) -> &str {
        self.id
    }

    fn model(&self) -> &str {
        "echo-chat"
    }

    fn vision_model(&self) -> &str {
        "echo-vision"
    }

    fn audit_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(key) = &self.api_key {
            headers.insert("authorization".to_string(), format!("Bearer {}", key));
            headers.insert("api_key".to_string(), key.clone());
        }
        headers
    }

    async fn complete_text(
        &self,
        prompt: &str,
        _params: &CallParams,
    ) -> anyhow::Result<ModelResponse> {
        Ok(self.reply(prompt))
    }

    async fn complete_chat(
        &self,
        messages: &[ChatMessage],
        params: &CallParams,
    ) -> anyhow::Result<ModelResponse> {
        let last = messages
            .last()
            .and_then(|m| m.content.as_text())
            .unwrap_or_default();
        if last == "2+2?" && params.temperature == 0.0 {
            Ok(self.reply("4"))
        } else {
            Ok(self.reply(last))
        }
    }

    async fn describe_image(
        &self,
        _image_url: &str,
        prompt: &str,
        _params: &CallParams,
    ) -> anyhow::Result<ModelResponse> {
        Ok(self.reply(&format!("image: {}", prompt)))
    }
}

fn descriptor(id: &'static str) -> ProviderDescriptor {
    ProviderDescriptor::new(id, move |entry, _client| {
        Arc::new(EchoAdapter {
            id,
            api_key: entry.api_key.clone(),
        })
    })
}

fn registry(
    config_json: &str,
) -> (ServiceRegistry, MemoryAuditSink, CollectingDiagnostics) {
    let config: AiConfig = serde_json::from_str(config_json).unwrap();
    let sink = MemoryAuditSink::new();
    let diagnostics = CollectingDiagnostics::new();
    let registry = ServiceRegistry::builder(config)
        .register(descriptor("primary"))
        .register(descriptor("secondary"))
        .fallback_provider("primary")
        .audit_sink(Arc::new(sink.clone()))
        .diagnostics(Arc::new(diagnostics.clone()))
        .build()
        .unwrap();
    (registry, sink, diagnostics)
}

#[tokio::test]
async fn chat_completion_end_to_end() {
    let (registry, _sink, _diagnostics) = registry("{}");

    let response = facade::generate_chat_completion(
        &registry,
        &[ChatMessage::user("2+2?")],
        RequestOptions::new().with_temperature(0.0),
    )
    .await
    .unwrap();

    assert_eq!(response.text(), "4");
    assert_eq!(response.usage().map(|u| u.total_tokens), Some(10));
    assert_eq!(response.metadata().provider, "primary");
}

#[tokio::test]
async fn identical_calls_produce_equal_responses() {
    let (registry, _sink, _diagnostics) = registry("{}");
    let messages = [
        ChatMessage::system("You are a valuation assistant."),
        ChatMessage::user("Summarise comps for 4 Oak Lane"),
    ];
    let options = RequestOptions::new().with_max_tokens(128).with_session_id("s-1");

    let first = facade::generate_chat_completion(&registry, &messages, options.clone())
        .await
        .unwrap();
    let second = facade::generate_chat_completion(&registry, &messages, options)
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn provider_override_routes_and_is_stripped() {
    let (registry, sink, _diagnostics) = registry("{}");

    let response = facade::generate_text(
        &registry,
        "Describe the neighbourhood",
        RequestOptions::new().with_provider("secondary"),
    )
    .await
    .unwrap();
    assert_eq!(response.metadata().provider, "secondary");

    registry.flush_audit().await;
    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].source, "ai-service:secondary");
}

#[tokio::test]
async fn unknown_override_falls_back_to_default() {
    let (registry, _sink, diagnostics) = registry(r#"{"defaultProvider": "secondary"}"#);

    let response = facade::generate_text(
        &registry,
        "hello",
        RequestOptions::new().with_provider("mystery"),
    )
    .await
    .unwrap();

    assert_eq!(response.metadata().provider, "secondary");
    assert!(diagnostics.events().iter().any(|d| matches!(
        d,
        Diagnostic::UnknownProvider { requested, fallback }
            if requested == "mystery" && fallback == "secondary"
    )));
}

#[tokio::test]
async fn audit_trail_never_contains_credentials() {
    let (registry, sink, _diagnostics) =
        registry(r#"{"providers": {"primary": {"apiKey": "sk-primary-0123456789"}}}"#);

    facade::generate_text(&registry, "hi", RequestOptions::new().with_tags(["valuation"]))
        .await
        .unwrap();
    registry.flush_audit().await;

    let entries = sink.entries();
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert!(!entry.details.contains("sk-primary-0123456789"));
        assert_eq!(entry.category, "AI");
        assert_eq!(entry.tags, vec!["valuation".to_string()]);
    }
    let details = entries[0].details_json();
    let headers = &details["headers"];
    assert_eq!(headers["authorization"], REDACTED);
    assert_eq!(headers["api_key"], REDACTED);
}

#[tokio::test]
async fn availability_follows_configured_credentials() {
    let (registry, _sink, _diagnostics) =
        registry(r#"{"providers": {"secondary": {"apiKey": "k"}}}"#);

    assert_eq!(facade::list_available_providers(&registry), vec!["secondary"]);
    assert!(registry.is_provider_available("secondary"));
    assert!(!registry.is_provider_available("primary"));
}

#[tokio::test]
async fn validation_errors_surface_before_dispatch() {
    let (registry, sink, _diagnostics) = registry("{}");

    let err = facade::generate_chat_completion(&registry, &[], RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AiError::Validation(_)));

    let err = facade::process_image(&registry, "%%%", "what is this?", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AiError::Validation(_)));

    let err = facade::generate_text(
        &registry,
        "hi",
        RequestOptions::new().with_timeout(Duration::ZERO),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AiError::Validation(_)));

    registry.flush_audit().await;
    assert!(sink.entries().is_empty());
}

#[tokio::test]
async fn concurrent_callers_share_one_service() {
    let (registry, sink, _diagnostics) = registry("{}");
    let registry = Arc::new(registry);

    let calls = (0..8).map(|i| {
        let registry = Arc::clone(&registry);
        async move {
            facade::generate_text(&registry, &format!("parcel {}", i), RequestOptions::new()).await
        }
    });
    let results = futures::future::join_all(calls).await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().text(), format!("parcel {}", i));
    }
    assert!(Arc::ptr_eq(
        &registry.get_service("primary"),
        &registry.get_default_service()
    ));

    registry.flush_audit().await;
    assert_eq!(sink.entries().len(), 16);
}
