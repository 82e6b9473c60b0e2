//! Configuration for the AI layer.
//!
//! Loads typed configuration from `~/.valuai/config.json` when present and
//! overlays the process environment on top. All fields use `serde` with
//! defaults so a missing file or empty environment is valid.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::provider::{GROK, OPENAI};

/// Environment variable naming the default provider identity.
pub const DEFAULT_PROVIDER_ENV: &str = "AI_DEFAULT_PROVIDER";
/// Environment variable overriding the request timeout (seconds).
pub const TIMEOUT_ENV: &str = "AI_REQUEST_TIMEOUT_SECS";
/// Environment variable holding the JSONL audit log path.
pub const AUDIT_LOG_ENV: &str = "AI_AUDIT_LOG";

/// Provider identities whose `<ID>_*` variables are read from the environment.
const ENV_PROVIDERS: &[&str] = &[OPENAI, GROK];

/// Root configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiConfig {
    pub default_provider: Option<String>,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub providers: BTreeMap<String, ProviderEntry>,
    pub audit: AuditConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            request_timeout_secs: 30,
            temperature: 0.7,
            max_tokens: 1024,
            providers: BTreeMap::new(),
            audit: AuditConfig::default(),
        }
    }
}

/// Per-provider settings. Everything is optional; adapters supply their
/// own base URL and model defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderEntry {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub vision_model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            queue_capacity: crate::audit::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl AiConfig {
    /// Load `~/.valuai/config.json` (if any) and overlay the environment.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        let config = if path.exists() {
            Self::read_file(&path)?
        } else {
            AiConfig::default()
        };
        Ok(config.overlay_with(|key| std::env::var(key).ok()))
    }

    /// Load a specific file and overlay the environment.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::read_file(path)?.overlay_with(|key| std::env::var(key).ok()))
    }

    fn read_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: AiConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// `~/.valuai/config.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".valuai")
            .join("config.json")
    }

    /// Apply variables from `lookup` on top of this configuration.
    /// Empty values are ignored.
    pub fn overlay_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = get(DEFAULT_PROVIDER_ENV) {
            self.default_provider = Some(id.trim().to_lowercase());
        }
        if let Some(secs) = get(TIMEOUT_ENV).and_then(|v| v.trim().parse::<u64>().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(path) = get(AUDIT_LOG_ENV) {
            self.audit.path = Some(PathBuf::from(path));
        }

        for id in ENV_PROVIDERS {
            let prefix = id.to_uppercase();
            let api_key = get(&format!("{}_API_KEY", prefix));
            let api_base = get(&format!("{}_API_BASE", prefix));
            let model = get(&format!("{}_MODEL", prefix));
            let vision_model = get(&format!("{}_VISION_MODEL", prefix));

            if api_key.is_none()
                && api_base.is_none()
                && model.is_none()
                && vision_model.is_none()
            {
                continue;
            }
            let entry = self.providers.entry(id.to_string()).or_default();
            if api_key.is_some() {
                entry.api_key = api_key;
            }
            if api_base.is_some() {
                entry.api_base = api_base;
            }
            if model.is_some() {
                entry.model = model;
            }
            if vision_model.is_some() {
                entry.vision_model = vision_model;
            }
        }
        self
    }

    /// Settings for one provider (empty if not configured).
    pub fn provider(&self, id: &str) -> ProviderEntry {
        self.providers.get(id).cloned().unwrap_or_default()
    }

    /// The provider's API key, if set to a non-blank value.
    pub fn credential(&self, id: &str) -> Option<&str> {
        self.providers
            .get(id)
            .and_then(|entry| entry.api_key.as_deref())
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
