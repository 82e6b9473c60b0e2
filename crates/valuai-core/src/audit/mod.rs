//! Request/response audit trail.
//!
//! Every service call produces a "dispatched" entry followed by exactly one
//! outcome entry. Entries are handed to an [`AuditLogger`], which queues
//! them for a single background writer so that a slow or failing store
//! never delays the caller. Writer failures go to the diagnostics sink.

pub mod sink;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::redact::redact;
pub use sink::{AuditSink, JsonlAuditSink, MemoryAuditSink};

/// Category tag carried by every entry this crate writes.
pub const AUDIT_CATEGORY: &str = "AI";

/// Default capacity of the writer queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Error,
}

/// Correlation data shared by all entries of one call.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub request_id: Uuid,
    pub source: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub tags: Vec<String>,
}

/// One audit record. Built once by [`AuditLogEntry::new`] and handed over
/// by value; nothing in this crate mutates an entry afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub level: AuditLevel,
    pub category: String,
    pub message: String,
    /// Redacted JSON detail blob.
    pub details: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AuditLogEntry {
    /// Build an entry. `details` is redacted before it is serialised, so an
    /// entry never holds a raw credential.
    pub fn new(
        level: AuditLevel,
        message: impl Into<String>,
        details: &Value,
        ctx: &AuditContext,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: ctx.request_id,
            level,
            category: AUDIT_CATEGORY.to_string(),
            message: message.into(),
            details: redact(details).to_string(),
            source: ctx.source.clone(),
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            project_id: ctx.project_id.clone(),
            duration_ms: None,
            status_code: None,
            tags: ctx.tags.clone(),
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Parse the detail blob back into JSON.
    pub fn details_json(&self) -> Value {
        serde_json::from_str(&self.details).unwrap_or(Value::Null)
    }
}

enum Command {
    Write(Box<AuditLogEntry>),
    Flush(oneshot::Sender<()>),
}

/// Non-blocking front end of the audit trail.
///
/// Cheap to clone; all clones feed the same writer task, which appends
/// entries in the order they were queued.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<Command>,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl AuditLogger {
    /// Start the writer task. Must be called from inside a Tokio runtime.
    pub fn spawn(
        sink: Arc<dyn AuditSink>,
        diagnostics: Arc<dyn DiagnosticsSink>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_writer(sink, Arc::clone(&diagnostics), rx));
        (Self { tx, diagnostics }, handle)
    }

    /// Queue an entry. Never waits; a full or closed queue is reported to
    /// diagnostics and the entry is dropped.
    pub fn log(&self, entry: AuditLogEntry) {
        let source = entry.source.clone();
        match self.tx.try_send(Command::Write(Box::new(entry))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.diagnostics.report(Diagnostic::AuditQueueFull { source });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.diagnostics.report(Diagnostic::AuditWriteFailed {
                    source,
                    error: "audit writer has stopped".into(),
                });
            }
        }
    }

    /// Wait until every entry queued before this call has been handled.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_writer(
    sink: Arc<dyn AuditSink>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    mut rx: mpsc::Receiver<Command>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Write(entry) => {
                let source = entry.source.clone();
                if let Err(e) = sink.append(*entry).await {
                    diagnostics.report(Diagnostic::AuditWriteFailed {
                        source,
                        error: format!("{:#}", e),
                    });
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Audit writer stopped");
}
