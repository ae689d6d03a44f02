//! # Bonza Core
//!
//! Domain types, traits, and error definitions for the Bonza agent orchestrator.
//! This crate has **no framework dependencies**: it defines the domain model
//! that the provider, tool, security, and agent crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the turn loop is a trait here:
//! - [`Provider`] for model backends
//! - [`Tool`] for callable capabilities
//! - [`ConversationContext`] for message history
//!
//! Implementations live in their respective crates, so the loop can be
//! driven entirely by in-memory fakes in tests.

pub mod autonomy;
pub mod context;
pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod provider;
pub mod tool;
pub mod util;

// Re-export key types at crate root for ergonomics
pub use autonomy::{AutonomyScope, AutonomySettings, AutonomySnapshot, TrustLevel};
pub use context::{ConversationContext, InMemoryContext};
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{AgentEvent, Observers};
pub use message::{ContentPart, Message, MessageContent, MessageToolCall, Role};
pub use model::{ModelCatalog, ModelInfo};
pub use provider::{
    ModelRoute, Provider, ProviderRequest, ProviderResponse, StreamEvent, StreamReceiver,
    ToolDefinition, Usage,
};
pub use tool::{Tool, ToolRegistry, ToolResult};
