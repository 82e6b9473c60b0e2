//! Base service wrapped around every provider adapter.
//!
//! `AiService` owns the cross-cutting behaviour of a call: input
//! validation, default parameters, the timeout race, redacted audit
//! logging and error normalisation. Adapters plug in underneath through
//! [`ProviderAdapter`] and never see any of it.
//!
//! Each call runs `Dispatched -> (TimedOut | VendorError | Completed)`.
//! There is no retry; callers retry if they want to.

pub mod image;

use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::{AuditContext, AuditLevel, AuditLogEntry, AuditLogger};
use crate::config::AiConfig;
use crate::error::{AiError, Result};
use crate::provider::types::{validate_messages, ChatMessage, ModelResponse, RequestOptions};
use crate::provider::{CallParams, ProviderAdapter, VendorError};

/// Status recorded for a successful call.
const STATUS_OK: u16 = 200;
/// Status recorded for a vendor failure without an HTTP status.
const STATUS_BAD_GATEWAY: u16 = 502;
/// Status recorded when the timeout fired.
const STATUS_GATEWAY_TIMEOUT: u16 = 504;

/// Service-wide fallbacks for options the caller left unset.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefaults {
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl From<&AiConfig> for ServiceDefaults {
    fn from(config: &AiConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Text,
    Chat,
    Image,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Text => "text",
            Operation::Chat => "chat",
            Operation::Image => "image",
        }
    }
}

/// A provider adapter plus the behaviour every call shares.
pub struct AiService {
    adapter: Arc<dyn ProviderAdapter>,
    defaults: ServiceDefaults,
    audit: Option<AuditLogger>,
}

impl AiService {
    pub fn new(
        adapter: Arc<dyn ProviderAdapter>,
        defaults: ServiceDefaults,
        audit: Option<AuditLogger>,
    ) -> Self {
        Self {
            adapter,
            defaults,
            audit,
        }
    }

    /// Identity of the wrapped adapter.
    pub fn provider(&self) -> &str {
        self.adapter.id()
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }

    pub fn defaults(&self) -> &ServiceDefaults {
        &self.defaults
    }

    /// Generate text from a single prompt.
    pub async fn generate_text(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<ModelResponse> {
        options.validate()?;
        if prompt.trim().is_empty() {
            return Err(AiError::Validation("prompt must not be empty".into()));
        }
        let params = self.call_params(options);
        let input = json!({ "prompt": prompt });
        self.execute(
            Operation::Text,
            self.adapter.model(),
            input,
            options,
            self.adapter.complete_text(prompt, &params),
        )
        .await
    }

    /// Run a chat completion over the caller's messages, in order.
    pub async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &RequestOptions,
    ) -> Result<ModelResponse> {
        options.validate()?;
        validate_messages(messages)?;
        let params = self.call_params(options);
        let input = json!({
            "messages": messages
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content.audit_view() }))
                .collect::<Vec<_>>(),
        });
        self.execute(
            Operation::Chat,
            self.adapter.model(),
            input,
            options,
            self.adapter.complete_chat(messages, &params),
        )
        .await
    }

    /// Describe a base64-encoded image (raw or `data:` URL).
    pub async fn process_image(
        &self,
        image_base64: &str,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<ModelResponse> {
        options.validate()?;
        if prompt.trim().is_empty() {
            return Err(AiError::Validation("prompt must not be empty".into()));
        }
        let image = image::inline_image(image_base64)?;
        let params = self.call_params(options);
        let input = json!({
            "prompt": prompt,
            "image": { "mime": image.mime, "bytes": image.byte_len },
        });
        self.execute(
            Operation::Image,
            self.adapter.vision_model(),
            input,
            options,
            self.adapter.describe_image(&image.data_url, prompt, &params),
        )
        .await
    }

    /// Wait for queued audit entries to be written.
    pub async fn flush_audit(&self) {
        if let Some(audit) = &self.audit {
            audit.flush().await;
        }
    }

    fn call_params(&self, options: &RequestOptions) -> CallParams {
        CallParams {
            temperature: options.temperature().unwrap_or(self.defaults.temperature),
            max_tokens: options.max_tokens().unwrap_or(self.defaults.max_tokens),
            stop: options.stop().to_vec(),
        }
    }

    async fn execute<F>(
        &self,
        operation: Operation,
        model: &str,
        input: Value,
        options: &RequestOptions,
        call: F,
    ) -> Result<ModelResponse>
    where
        F: Future<Output = anyhow::Result<ModelResponse>>,
    {
        let timeout = options.timeout().unwrap_or(self.defaults.timeout);
        let ctx = self.audit_context(options);

        self.record(|| {
            AuditLogEntry::new(
                AuditLevel::Info,
                format!("AI {} request dispatched to {}", operation.as_str(), self.provider()),
                &json!({
                    "operation": operation.as_str(),
                    "provider": self.provider(),
                    "model": model,
                    "endpoint": self.adapter.endpoint(),
                    "headers": self.adapter.audit_headers(),
                    "options": options_view(options, timeout),
                    "input": input,
                }),
                &ctx,
            )
        });

        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(AiError::external(self.provider(), e)),
            Err(_) => Err(AiError::Timeout {
                provider: self.provider().to_string(),
                duration: timeout,
            }),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(response) => {
                debug!(
                    provider = %self.provider(),
                    operation = operation.as_str(),
                    duration_ms,
                    "AI request completed"
                );
                self.record(|| {
                    AuditLogEntry::new(
                        AuditLevel::Info,
                        format!("AI {} request completed", operation.as_str()),
                        &json!({
                            "operation": operation.as_str(),
                            "response": response,
                        }),
                        &ctx,
                    )
                    .with_duration_ms(duration_ms)
                    .with_status_code(STATUS_OK)
                });
            }
            Err(err) => {
                warn!(
                    provider = %self.provider(),
                    operation = operation.as_str(),
                    duration_ms,
                    error = %err,
                    "AI request failed"
                );
                self.record(|| {
                    AuditLogEntry::new(
                        AuditLevel::Error,
                        format!("AI {} request failed: {}", operation.as_str(), err.kind()),
                        &error_details(operation, err),
                        &ctx,
                    )
                    .with_duration_ms(duration_ms)
                    .with_status_code(status_for(err))
                });
            }
        }

        outcome
    }

    fn audit_context(&self, options: &RequestOptions) -> AuditContext {
        AuditContext {
            request_id: Uuid::new_v4(),
            source: format!("ai-service:{}", self.provider()),
            user_id: options.user_id().map(str::to_string),
            session_id: options.session_id().map(str::to_string),
            project_id: options.project_id().map(str::to_string),
            tags: options.tags().to_vec(),
        }
    }

    /// Build and queue an entry, only if auditing is enabled.
    fn record<F>(&self, build: F)
    where
        F: FnOnce() -> AuditLogEntry,
    {
        if let Some(audit) = &self.audit {
            audit.log(build());
        }
    }
}

fn options_view(options: &RequestOptions, timeout: Duration) -> Value {
    json!({
        "timeout_ms": timeout.as_millis() as u64,
        "temperature": options.temperature(),
        "max_tokens": options.max_tokens(),
        "stop": options.stop(),
    })
}

fn error_details(operation: Operation, err: &AiError) -> Value {
    let mut details = json!({
        "operation": operation.as_str(),
        "kind": err.kind(),
        "message": err.to_string(),
    });
    match err {
        AiError::Timeout { duration, .. } => {
            details["timeout_ms"] = json!(duration.as_millis() as u64);
        }
        AiError::ExternalService { source, .. } => {
            details["cause"] = json!(format!("{:#}", source));
        }
        AiError::Validation(_) => {}
    }
    details
}

fn status_for(err: &AiError) -> u16 {
    match err {
        AiError::Timeout { .. } => STATUS_GATEWAY_TIMEOUT,
        AiError::ExternalService { source, .. } => source
            .downcast_ref::<VendorError>()
            .map(|e| e.status)
            .unwrap_or(STATUS_BAD_GATEWAY),
        AiError::Validation(_) => 400,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::diagnostics::{CollectingDiagnostics, Diagnostic};
    use crate::provider::types::{ResponseMetadata, Usage};
    use crate::redact::REDACTED;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Echo,
        Hang,
        Fail,
    }

    struct MockAdapter {
        behaviour: Behaviour,
        seen: Mutex<Vec<CallParams>>,
    }

    impl MockAdapter {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                seen: Mutex::new(Vec::new()),
            })
        }

        async fn respond(&self, text: &str, params: &CallParams) -> anyhow::Result<ModelResponse> {
            self.seen.lock().unwrap().push(params.clone());
            match self.behaviour {
                Behaviour::Echo => Ok(ModelResponse::new(
                    text,
                    Some(Usage {
                        prompt_tokens: 3,
                        completion_tokens: 1,
                        total_tokens: 4,
                    }),
                    ResponseMetadata {
                        provider: "mock".into(),
                        model: "mock-1".into(),
                        finish_reason: Some("stop".into()),
                    },
                )),
                Behaviour::Hang => std::future::pending().await,
                Behaviour::Fail => Err(VendorError {
                    provider: "mock".into(),
                    status: 429,
                    message: "rate limited for key sk-abcdefghijklmnop".into(),
                }
                .into()),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn id(&self) -> &str {
            "mock"
        }
        fn model(&self) -> &str {
            "mock-1"
        }
        fn vision_model(&self) -> &str {
            "mock-vision"
        }
        fn audit_headers(&self) -> BTreeMap<String, String> {
            BTreeMap::from([(
                "Authorization".to_string(),
                "Bearer sk-supersecretvalue".to_string(),
            )])
        }
        async fn complete_text(
            &self,
            prompt: &str,
            params: &CallParams,
        ) -> anyhow::Result<ModelResponse> {
            self.respond(prompt, params).await
        }
        async fn complete_chat(
            &self,
            messages: &[ChatMessage],
            params: &CallParams,
        ) -> anyhow::Result<ModelResponse> {
            let last = messages
                .last()
                .and_then(|m| m.content.as_text())
                .unwrap_or_default()
                .to_string();
            self.respond(&last, params).await
        }
        async fn describe_image(
            &self,
            image_url: &str,
            _prompt: &str,
            params: &CallParams,
        ) -> anyhow::Result<ModelResponse> {
            let mime = image_url
                .strip_prefix("data:")
                .and_then(|rest| rest.split(';').next())
                .unwrap_or_default()
                .to_string();
            self.respond(&mime, params).await
        }
    }

    fn service(adapter: Arc<MockAdapter>) -> (AiService, MemoryAuditSink) {
        let sink = MemoryAuditSink::new();
        let (logger, _handle) = AuditLogger::spawn(
            Arc::new(sink.clone()),
            Arc::new(CollectingDiagnostics::new()),
            64,
        );
        (
            AiService::new(adapter, ServiceDefaults::default(), Some(logger)),
            sink,
        )
    }

    #[tokio::test]
    async fn test_success_logs_dispatch_then_completion() {
        let (svc, sink) = service(MockAdapter::new(Behaviour::Echo));
        let options = RequestOptions::new()
            .with_user_id("appraiser-7")
            .with_tags(["comps"]);

        let response = svc.generate_text("value 12 Elm St", &options).await.unwrap();
        assert_eq!(response.text(), "value 12 Elm St");
        svc.flush_audit().await;

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, AuditLevel::Info);
        assert!(entries[0].message.contains("dispatched"));
        assert_eq!(entries[1].status_code, Some(200));
        assert_eq!(entries[0].request_id, entries[1].request_id);
        assert_eq!(entries[1].user_id.as_deref(), Some("appraiser-7"));
        assert_eq!(entries[1].tags, vec!["comps".to_string()]);
        assert_eq!(entries[0].source, "ai-service:mock");
    }

    #[tokio::test]
    async fn test_dispatch_entry_redacts_headers() {
        let (svc, sink) = service(MockAdapter::new(Behaviour::Echo));
        svc.generate_text("hi", &RequestOptions::new()).await.unwrap();
        svc.flush_audit().await;

        let dispatched = &sink.entries()[0];
        assert!(!dispatched.details.contains("supersecretvalue"));
        assert_eq!(
            dispatched.details_json()["headers"]["Authorization"],
            REDACTED
        );
    }

    #[tokio::test]
    async fn test_defaults_fill_unset_options() {
        let adapter = MockAdapter::new(Behaviour::Echo);
        let (svc, _sink) = service(Arc::clone(&adapter));
        svc.generate_text("a", &RequestOptions::new()).await.unwrap();
        svc.generate_text("b", &RequestOptions::new().with_temperature(0.0).with_stop(["\n"]))
            .await
            .unwrap();

        let seen = adapter.seen.lock().unwrap().clone();
        assert_eq!(seen[0].temperature, 0.7);
        assert_eq!(seen[0].max_tokens, 1024);
        assert_eq!(seen[1].temperature, 0.0);
        assert_eq!(seen[1].stop, vec!["\n".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_configured_duration() {
        let (svc, sink) = service(MockAdapter::new(Behaviour::Hang));
        let options = RequestOptions::new().with_timeout(Duration::from_millis(50));

        let started = Instant::now();
        let err = svc.generate_text("slow", &options).await.unwrap_err();
        let elapsed = started.elapsed();

        match err {
            AiError::Timeout { duration, provider } => {
                assert_eq!(duration, Duration::from_millis(50));
                assert_eq!(provider, "mock");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(100));

        svc.flush_audit().await;
        let entries = sink.entries();
        assert_eq!(entries[1].level, AuditLevel::Error);
        assert_eq!(entries[1].status_code, Some(504));
    }

    #[tokio::test]
    async fn test_timeout_returns_promptly_on_real_clock() {
        let (svc, _sink) = service(MockAdapter::new(Behaviour::Hang));
        let options = RequestOptions::new().with_timeout(Duration::from_millis(50));
        let started = std::time::Instant::now();
        let err = svc.generate_text("slow", &options).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_vendor_error_is_wrapped() {
        let (svc, sink) = service(MockAdapter::new(Behaviour::Fail));
        let err = svc
            .generate_chat_completion(&[ChatMessage::user("hi")], &RequestOptions::new())
            .await
            .unwrap_err();
        match &err {
            AiError::ExternalService { provider, .. } => assert_eq!(provider, "mock"),
            other => panic!("expected external service error, got {:?}", other),
        }

        svc.flush_audit().await;
        let failed = &sink.entries()[1];
        assert_eq!(failed.status_code, Some(429));
        assert!(!failed.details.contains("sk-abcdefghijklmnop"));
    }

    #[tokio::test]
    async fn test_validation_fails_before_logging() {
        let adapter = MockAdapter::new(Behaviour::Echo);
        let (svc, sink) = service(Arc::clone(&adapter));

        let err = svc
            .generate_chat_completion(&[], &RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Validation(_)));

        let err = svc
            .generate_text("x", &RequestOptions::new().with_timeout(Duration::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Validation(_)));

        svc.flush_audit().await;
        assert!(sink.entries().is_empty());
        assert!(adapter.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_image_is_normalised_and_not_logged() {
        use base64::Engine as _;
        let (svc, sink) = service(MockAdapter::new(Behaviour::Echo));
        let png = base64::engine::general_purpose::STANDARD
            .encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);

        let response = svc
            .process_image(&png, "Describe the facade", &RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(response.text(), "image/png");

        svc.flush_audit().await;
        let dispatched = &sink.entries()[0];
        assert!(!dispatched.details.contains(&png));
        assert_eq!(dispatched.details_json()["model"], "mock-vision");
        assert_eq!(dispatched.details_json()["input"]["image"]["bytes"], 8);
    }

    struct UnavailableSink;

    #[async_trait]
    impl crate::audit::AuditSink for UnavailableSink {
        async fn append(&self, _entry: AuditLogEntry) -> anyhow::Result<()> {
            anyhow::bail!("audit store offline")
        }
    }

    #[tokio::test]
    async fn test_failing_audit_sink_does_not_fail_the_call() {
        let diagnostics = CollectingDiagnostics::new();
        let (logger, _handle) =
            AuditLogger::spawn(Arc::new(UnavailableSink), Arc::new(diagnostics.clone()), 16);
        let svc = AiService::new(
            MockAdapter::new(Behaviour::Echo),
            ServiceDefaults::default(),
            Some(logger),
        );

        let response = svc
            .generate_text("value 3 Birch Rd", &RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(response.text(), "value 3 Birch Rd");
        svc.flush_audit().await;

        let events = diagnostics.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|d| matches!(
            d,
            Diagnostic::AuditWriteFailed { source, error }
                if source == "ai-service:mock" && error.contains("audit store offline")
        )));
    }

    #[tokio::test]
    async fn test_no_audit_logger_still_answers() {
        let svc = AiService::new(
            MockAdapter::new(Behaviour::Echo),
            ServiceDefaults::default(),
            None,
        );
        let response = svc.generate_text("ok", &RequestOptions::new()).await.unwrap();
        assert_eq!(response.text(), "ok");
        svc.flush_audit().await;
    }
}
