//! Stream aggregation: folds one model call's event stream into a reply.
//!
//! Content deltas are concatenated and forwarded to observers as they
//! arrive. Tool calls are taken whole: the first non-empty batch wins,
//! whether it came as a `ToolCalls` event or bundled in `Finish`. A
//! `Finish` carrying `full_text` replaces the locally accumulated text.

use bonza_core::error::ProviderError;
use bonza_core::event::{AgentEvent, Observers};
use bonza_core::message::MessageToolCall;
use bonza_core::provider::{ProviderResponse, StreamEvent, StreamReceiver, Usage};

/// The model's reply for one round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    pub text: String,
    pub tool_calls: Vec<MessageToolCall>,
    pub usage: Option<Usage>,
}

impl Aggregate {
    /// A blocking response viewed as an aggregate.
    pub fn from_response(response: ProviderResponse) -> Self {
        Self {
            text: response.message.text(),
            tool_calls: response.message.tool_calls,
            usage: response.usage,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Drain `rx` to completion.
///
/// An error item aborts aggregation and is returned as is, so the caller's
/// failover treats a broken stream like a failed call.
pub async fn aggregate(
    mut rx: StreamReceiver,
    observers: &Observers,
) -> Result<Aggregate, ProviderError> {
    let mut out = Aggregate::default();

    while let Some(event) = rx.recv().await {
        match event? {
            StreamEvent::Content { delta } => {
                out.text.push_str(&delta);
                observers.emit(AgentEvent::Delta(delta));
            }
            StreamEvent::ToolCalls { calls } => {
                if out.tool_calls.is_empty() && !calls.is_empty() {
                    observers.emit(AgentEvent::ToolCalls(
                        serde_json::to_string(&calls).unwrap_or_default(),
                    ));
                    out.tool_calls = calls;
                }
            }
            StreamEvent::Finish {
                full_text,
                tool_calls,
                usage,
            } => {
                if let Some(text) = full_text {
                    out.text = text;
                }
                if out.tool_calls.is_empty() {
                    out.tool_calls = tool_calls;
                }
                out.usage = usage.or(out.usage);
                break;
            }
        }
    }

    Ok(out)
}
