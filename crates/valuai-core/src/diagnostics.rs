//! Local diagnostics channel.
//!
//! Problems that must never reach the caller (audit write failures,
//! provider fallbacks) are reported here instead. The default sink writes
//! them to `tracing`; tests swap in [`CollectingDiagnostics`].

use std::sync::{Arc, Mutex};
use tracing::warn;

/// A condition worth surfacing to operators but not to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `get_service` was asked for an identity nobody registered.
    UnknownProvider { requested: String, fallback: String },
    /// The configured default provider is not registered.
    UnrecognizedDefaultProvider { configured: String, fallback: String },
    /// The audit sink rejected an entry.
    AuditWriteFailed { source: String, error: String },
    /// The audit queue was full and an entry was dropped.
    AuditQueueFull { source: String },
}

/// Receiver for [`Diagnostic`] events.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing::warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::UnknownProvider {
                requested,
                fallback,
            } => warn!(
                requested = %requested,
                fallback = %fallback,
                "Unknown AI provider, using default"
            ),
            Diagnostic::UnrecognizedDefaultProvider {
                configured,
                fallback,
            } => warn!(
                configured = %configured,
                fallback = %fallback,
                "Configured default AI provider is not registered"
            ),
            Diagnostic::AuditWriteFailed { source, error } => {
                warn!(source = %source, error = %error, "Failed to write AI audit entry")
            }
            Diagnostic::AuditQueueFull { source } => {
                warn!(source = %source, "AI audit queue full, entry dropped")
            }
        }
    }
}

/// Keeps every reported diagnostic in memory.
#[derive(Debug, Default, Clone)]
pub struct CollectingDiagnostics {
    events: Arc<Mutex<Vec<Diagnostic>>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticsSink for CollectingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(diagnostic);
        }
    }
}
