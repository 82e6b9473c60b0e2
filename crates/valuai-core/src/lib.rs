//! valuai-core: provider-agnostic AI request layer.
//!
//! Lets the valuation platform issue text, chat and vision requests without
//! knowing which LLM vendor answers them:
//!
//! - [`provider`]: `ProviderAdapter` trait, request/response types, and the
//!   OpenAI and Grok adapters over a shared OpenAI-compatible transport
//! - [`service`]: `AiService`, the base every adapter runs under: timeouts,
//!   defaults, redacted audit logging, error normalisation
//! - [`registry`]: lazily built, cached services keyed by provider identity
//! - [`facade`]: `generate_text`, `generate_chat_completion`,
//!   `process_image`, `list_available_providers`
//! - [`audit`], [`redact`], [`diagnostics`], [`config`], [`error`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use valuai_core::audit::JsonlAuditSink;
//! use valuai_core::config::AiConfig;
//! use valuai_core::facade;
//! use valuai_core::provider::types::{ChatMessage, RequestOptions};
//! use valuai_core::registry::ServiceRegistry;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AiConfig::load()?;
//! let registry = ServiceRegistry::builder(config)
//!     .with_builtin_providers()
//!     .audit_sink(Arc::new(JsonlAuditSink::new(JsonlAuditSink::default_path())))
//!     .build()?;
//!
//! let reply = facade::generate_chat_completion(
//!     &registry,
//!     &[ChatMessage::user("Summarise the comparable sales")],
//!     RequestOptions::new().with_temperature(0.2),
//! )
//! .await?;
//! println!("{}", reply.text());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod facade;
pub mod provider;
pub mod redact;
pub mod registry;
pub mod service;

pub use error::{AiError, Result};
pub use provider::types::{
    ChatMessage, ContentPart, MessageContent, ModelResponse, RequestOptions, ResponseMetadata,
    Role, Usage,
};
pub use registry::{ProviderDescriptor, ServiceRegistry};
pub use service::AiService;
