//! Append-only stores for audit entries.

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::AuditLogEntry;

/// External store that accepts audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditLogEntry) -> anyhow::Result<()>;
}

/// Keeps entries in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: AuditLogEntry) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("audit buffer poisoned"))?
            .push(entry);
        Ok(())
    }
}

/// Writes one JSON object per line to a file.
///
/// The file is opened in append mode for every entry, so rotating or
/// deleting it while the process runs is safe.
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// `~/.valuai/audit.jsonl`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".valuai")
            .join("audit.jsonl")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back the last `limit` entries, oldest first. Unparseable lines
    /// are skipped.
    pub async fn read_recent(&self, limit: usize) -> anyhow::Result<Vec<AuditLogEntry>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read audit log {}", self.path.display()))?;

        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(error = %e, "Failed to parse audit line"),
            }
        }

        let start = entries.len().saturating_sub(limit);
        Ok(entries.split_off(start))
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, entry: AuditLogEntry) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(&entry).context("Failed to serialise audit entry")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
