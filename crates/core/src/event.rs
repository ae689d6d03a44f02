//! Observer events: how the turn loop talks to whatever is watching it.
//!
//! Observers are plain callbacks invoked synchronously, in registration
//! order, for every event. A panicking observer is isolated: the panic is
//! caught and logged, and the remaining observers still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Everything the agent reports while it works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The model chosen for this turn
    Model(String),

    /// A fragment of streamed assistant text
    Delta(String),

    /// Tool calls received from the stream, serialized as JSON
    ToolCalls(String),

    /// A tool is about to run
    ToolStart(String),

    /// A tool finished (result preview)
    ToolResult(String),

    /// Informational notice (failover, new chat, ...)
    Info(String),

    /// A tool call is waiting for the user's approval
    ApprovalRequired(String),

    /// A hint for the user, e.g. to start a new chat
    Suggestion(String),
}

impl AgentEvent {
    /// The wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Model(_) => "model",
            Self::Delta(_) => "delta",
            Self::ToolCalls(_) => "tool_calls",
            Self::ToolStart(_) => "tool_start",
            Self::ToolResult(_) => "tool_result",
            Self::Info(_) => "info",
            Self::ApprovalRequired(_) => "approval_required",
            Self::Suggestion(_) => "suggestion",
        }
    }

    /// The event payload.
    pub fn data(&self) -> &str {
        match self {
            Self::Model(s)
            | Self::Delta(s)
            | Self::ToolCalls(s)
            | Self::ToolStart(s)
            | Self::ToolResult(s)
            | Self::Info(s)
            | Self::ApprovalRequired(s)
            | Self::Suggestion(s) => s,
        }
    }
}

type Callback = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

/// The list of registered observers. Cheap to clone; clones share the list.
#[derive(Clone, Default)]
pub struct Observers {
    callbacks: Arc<RwLock<Vec<Callback>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&AgentEvent) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Register an observer that forwards every event into a channel.
    ///
    /// Events sent after the receiver is dropped are discarded.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Deliver an event to every observer.
    pub fn emit(&self, event: AgentEvent) {
        // Snapshot so a callback may subscribe without deadlocking.
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                tracing::warn!(event = event.event_type(), "Observer panicked; ignoring");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers").field("count", &self.len()).finish()
    }
}
