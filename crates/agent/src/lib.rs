//! The agent turn loop for Bonza.
//!
//! A turn follows a **call → act → observe** cycle:
//!
//! 1. **Receive** a user message (image markers become image parts)
//! 2. **Call the model** through the failover wrapper, streaming or not
//! 3. **If tool calls**: approve each one, dispatch it, record the result, loop back to step 2
//! 4. **If text**: append it to the history and return it
//!
//! The loop ends when the model answers without tool calls or the round
//! limit is reached. Everything that happens along the way is reported to
//! [`Observers`](bonza_core::Observers).

pub mod agent;
pub mod approval;
pub mod attachments;
pub mod dispatcher;
pub mod notify;
pub mod prompt;
pub mod selector;
pub mod stream;

pub use agent::{AgentCore, AgentOptions, AgentStats, CUTOFF_MESSAGE, REJECTED_MESSAGE};
pub use approval::{ApprovalHandler, ApprovalNotifier, FnApproval};
pub use attachments::build_user_content;
pub use dispatcher::Dispatcher;
pub use notify::{NotifyError, TelegramNotifier};
pub use prompt::system_prompt;
pub use selector::{FixedModelSelector, ModelSelector};
pub use stream::{Aggregate, aggregate};
