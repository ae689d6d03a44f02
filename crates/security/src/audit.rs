//! Audit logging: one structured record per tool execution.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single tool execution, as reported by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolAudit {
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    /// Serialized arguments, bounded
    pub arguments_preview: String,
    pub duration_ms: u64,
    pub outcome: AuditOutcome,
    /// Result text, bounded
    pub result_preview: String,
}

/// Outcome of an audited tool execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The tool ran and reported success
    Success,
    /// The tool ran and reported failure, or errored
    Failure,
    /// The tool panicked
    Panicked,
    /// No tool by that name
    UnknownTool,
}

impl AuditOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Trait for audit log sinks (where records are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &ToolAudit);
}

/// A tracing-based audit sink that logs records via `tracing::info!`.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: &ToolAudit) {
        tracing::info!(
            tool = %entry.tool_name,
            args = %entry.arguments_preview,
            duration_ms = entry.duration_ms,
            success = entry.outcome.is_success(),
            outcome = ?entry.outcome,
            result = %entry.result_preview,
            "TOOL_EXEC"
        );
    }
}

/// Keeps records in memory. Useful for tests and for `/stats`.
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<ToolAudit>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<ToolAudit> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &ToolAudit) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
    }
}

impl std::fmt::Debug for MemoryAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAuditSink")
            .field("entry_count", &self.count())
            .finish()
    }
}

/// Fan a record out to several sinks.
pub struct MultiSink(pub Vec<Box<dyn AuditSink>>);

impl AuditSink for MultiSink {
    fn record(&self, entry: &ToolAudit) {
        for sink in &self.0 {
            sink.record(entry);
        }
    }
}
