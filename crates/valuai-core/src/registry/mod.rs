//! Provider registry: resolves identities to shared service instances.
//!
//! Adapters are built lazily on first use and cached for the life of the
//! registry. The cache sits behind a mutex so that concurrent first-time
//! lookups of the same identity still produce exactly one instance.

use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::audit::{AuditLogger, AuditSink};
use crate::config::{AiConfig, ProviderEntry};
use crate::diagnostics::{Diagnostic, DiagnosticsSink, TracingDiagnostics};
use crate::provider::grok::GrokAdapter;
use crate::provider::openai::OpenAiAdapter;
use crate::provider::{ProviderAdapter, GROK, OPENAI};
use crate::service::{AiService, ServiceDefaults};

/// Identity used when no usable default is configured.
pub const FALLBACK_PROVIDER: &str = OPENAI;

type AdapterBuilder =
    Arc<dyn Fn(&ProviderEntry, &Client) -> Arc<dyn ProviderAdapter> + Send + Sync>;

/// How to build the adapter for one provider identity.
#[derive(Clone)]
pub struct ProviderDescriptor {
    id: String,
    build: AdapterBuilder,
}

impl ProviderDescriptor {
    pub fn new<F>(id: impl Into<String>, build: F) -> Self
    where
        F: Fn(&ProviderEntry, &Client) -> Arc<dyn ProviderAdapter> + Send + Sync + 'static,
    {
        Self {
            id: id.into().to_lowercase(),
            build: Arc::new(build),
        }
    }

    pub fn openai() -> Self {
        Self::new(OPENAI, |entry, client| {
            Arc::new(OpenAiAdapter::new(entry, client.clone()))
        })
    }

    pub fn grok() -> Self {
        Self::new(GROK, |entry, client| {
            Arc::new(GrokAdapter::new(entry, client.clone()))
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Builder for [`ServiceRegistry`].
pub struct RegistryBuilder {
    config: AiConfig,
    descriptors: Vec<ProviderDescriptor>,
    fallback: String,
    client: Option<Client>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    diagnostics: Option<Arc<dyn DiagnosticsSink>>,
}

impl RegistryBuilder {
    /// Register the shipped `openai` and `grok` adapters.
    pub fn with_builtin_providers(self) -> Self {
        self.register(ProviderDescriptor::openai())
            .register(ProviderDescriptor::grok())
    }

    /// Register a provider. A later descriptor with the same identity
    /// replaces the earlier one.
    pub fn register(mut self, descriptor: ProviderDescriptor) -> Self {
        self.descriptors.retain(|d| d.id != descriptor.id);
        self.descriptors.push(descriptor);
        self
    }

    /// Identity used when the configured default is unset or unknown.
    pub fn fallback_provider(mut self, id: impl Into<String>) -> Self {
        self.fallback = id.into().to_lowercase();
        self
    }

    pub fn http_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Finish the registry. Starts the audit writer when a sink was given,
    /// so this must run inside a Tokio runtime in that case.
    pub fn build(self) -> anyhow::Result<ServiceRegistry> {
        let first = match self.descriptors.first() {
            Some(d) => d.id.clone(),
            None => anyhow::bail!("no AI providers registered"),
        };
        let fallback = if self.descriptors.iter().any(|d| d.id == self.fallback) {
            self.fallback
        } else {
            first
        };

        let diagnostics = self
            .diagnostics
            .unwrap_or_else(|| Arc::new(TracingDiagnostics));

        let audit = self.audit_sink.map(|sink| {
            let (logger, _writer) = AuditLogger::spawn(
                sink,
                Arc::clone(&diagnostics),
                self.config.audit.queue_capacity,
            );
            logger
        });

        debug!(
            providers = self.descriptors.len(),
            fallback = %fallback,
            audit = audit.is_some(),
            "Built AI service registry"
        );

        Ok(ServiceRegistry {
            defaults: ServiceDefaults::from(&self.config),
            config: self.config,
            descriptors: self.descriptors,
            fallback,
            client: self.client.unwrap_or_default(),
            audit,
            diagnostics,
            cache: Mutex::new(HashMap::new()),
        })
    }
}

/// Resolves provider identities to cached [`AiService`] instances.
pub struct ServiceRegistry {
    config: AiConfig,
    defaults: ServiceDefaults,
    descriptors: Vec<ProviderDescriptor>,
    fallback: String,
    client: Client,
    audit: Option<AuditLogger>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    cache: Mutex<HashMap<String, Arc<AiService>>>,
}

impl ServiceRegistry {
    pub fn builder(config: AiConfig) -> RegistryBuilder {
        RegistryBuilder {
            config,
            descriptors: Vec::new(),
            fallback: FALLBACK_PROVIDER.to_string(),
            client: None,
            audit_sink: None,
            diagnostics: None,
        }
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// Registered identities in registration order.
    pub fn provider_ids(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.id.as_str()).collect()
    }

    /// Identity `get_default_service` resolves to.
    pub fn default_provider_id(&self) -> String {
        let configured = self.config.default_provider.as_deref();
        match configured.map(|id| (id, self.descriptor(id))) {
            Some((_, Some(descriptor))) => descriptor.id.clone(),
            Some((id, None)) => {
                self.diagnostics.report(Diagnostic::UnrecognizedDefaultProvider {
                    configured: id.to_string(),
                    fallback: self.fallback.clone(),
                });
                self.fallback.clone()
            }
            None => self.fallback.clone(),
        }
    }

    /// Service for `id`, created on first use. An unknown identity falls
    /// back to the default service and is reported to diagnostics.
    pub fn get_service(&self, id: &str) -> Arc<AiService> {
        if let Some(descriptor) = self.descriptor(id) {
            return self.resolve(descriptor);
        }
        let fallback = self.default_provider_id();
        self.diagnostics.report(Diagnostic::UnknownProvider {
            requested: id.to_string(),
            fallback: fallback.clone(),
        });
        self.get_service(&fallback)
    }

    /// Service for the configured default provider.
    pub fn get_default_service(&self) -> Arc<AiService> {
        let id = self.default_provider_id();
        self.get_service(&id)
    }

    /// Whether `id` is registered and its credential is configured.
    /// Reads configuration only.
    pub fn is_provider_available(&self, id: &str) -> bool {
        self.descriptor(id)
            .is_some_and(|d| self.config.credential(&d.id).is_some())
    }

    /// Registered providers whose credentials are present.
    pub fn list_available_providers(&self) -> Vec<String> {
        self.descriptors
            .iter()
            .filter(|d| self.config.credential(&d.id).is_some())
            .map(|d| d.id.clone())
            .collect()
    }

    /// Wait for queued audit entries to be written.
    pub async fn flush_audit(&self) {
        if let Some(audit) = &self.audit {
            audit.flush().await;
        }
    }

    fn descriptor(&self, id: &str) -> Option<&ProviderDescriptor> {
        let id = id.trim();
        self.descriptors
            .iter()
            .find(|d| d.id.eq_ignore_ascii_case(id))
    }

    fn resolve(&self, descriptor: &ProviderDescriptor) -> Arc<AiService> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(service) = cache.get(&descriptor.id) {
            return Arc::clone(service);
        }

        let entry = self.config.provider(&descriptor.id);
        let adapter = (descriptor.build)(&entry, &self.client);
        let service = Arc::new(AiService::new(
            adapter,
            self.defaults.clone(),
            self.audit.clone(),
        ));
        cache.insert(descriptor.id.clone(), Arc::clone(&service));
        debug!(provider = %descriptor.id, "Created AI service");
        service
    }
}
