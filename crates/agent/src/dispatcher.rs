//! Tool dispatcher: runs one tool call and turns every outcome into text.
//!
//! Unknown tools, tool errors and tool panics all come back as a bounded
//! error string that goes to the model as an ordinary tool result. Every
//! dispatch is reported to the audit sink.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use bonza_core::provider::ToolDefinition;
use bonza_core::tool::ToolRegistry;
use bonza_core::util::{preview, truncate_chars};
use bonza_security::{AuditOutcome, AuditSink, ToolAudit, TracingAuditSink};
use futures::FutureExt;
use serde_json::Value;

const MAX_ERROR_CHARS: usize = 1_000;
const AUDIT_ARGS_CHARS: usize = 200;
const AUDIT_RESULT_CHARS: usize = 100;

pub struct Dispatcher {
    tools: ToolRegistry,
    audit: Arc<dyn AuditSink>,
}

impl Dispatcher {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Tool schemas for the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.names()
    }

    pub fn count(&self) -> usize {
        self.tools.count()
    }

    /// Execute `name` with `arguments`. Never fails.
    pub async fn execute(&self, name: &str, arguments: Value) -> String {
        let args_preview = preview(&arguments.to_string(), AUDIT_ARGS_CHARS);

        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(tool = name, "Model requested an unknown tool");
            let text = format!("Error: Unknown tool '{name}'");
            self.record(name, args_preview, 0, AuditOutcome::UnknownTool, &text);
            return text;
        };

        let started = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(arguments)).catch_unwind().await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (text, audit_outcome) = match outcome {
            Ok(Ok(result)) => {
                let audit_outcome = if result.success {
                    AuditOutcome::Success
                } else {
                    AuditOutcome::Failure
                };
                (result.output, audit_outcome)
            }
            Ok(Err(e)) => (bounded_error(name, &e.to_string()), AuditOutcome::Failure),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!(tool = name, reason = %reason, "Tool panicked");
                (
                    bounded_error(name, &format!("tool panicked: {reason}")),
                    AuditOutcome::Panicked,
                )
            }
        };

        self.record(name, args_preview, duration_ms, audit_outcome, &text);
        text
    }

    fn record(
        &self,
        name: &str,
        arguments_preview: String,
        duration_ms: u64,
        outcome: AuditOutcome,
        result: &str,
    ) {
        self.audit.record(&ToolAudit {
            timestamp: chrono::Utc::now(),
            tool_name: name.to_string(),
            arguments_preview,
            duration_ms,
            outcome,
            result_preview: preview(result, AUDIT_RESULT_CHARS),
        });
    }
}

fn bounded_error(name: &str, reason: &str) -> String {
    format!("Error executing {name}: {}", truncate_chars(reason, MAX_ERROR_CHARS))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
