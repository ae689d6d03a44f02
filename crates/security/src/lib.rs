//! Security module for Bonza: approval policy, autonomy scope and audit logging.
//!
//! Provides:
//! - **Approval policy**: the trust-level decision table for tool calls
//! - **Command classification**: safe commands, shell metacharacters, destructive patterns
//! - **Autonomy scope**: `cd`-aware working-directory resolution and containment
//! - **Audit logging**: structured tool execution records and the project action log

pub mod audit;
pub mod commands;
pub mod policy;
pub mod project_log;
pub mod scope;

pub use audit::{AuditOutcome, AuditSink, MemoryAuditSink, MultiSink, ToolAudit, TracingAuditSink};
pub use commands::{find_dangerous, find_metacharacter, is_safe_command, matching_auto_approve};
pub use policy::{AskReason, AutoReason, CODE_TOOL, Decision, PolicyInput, TERMINAL_TOOL, decide};
pub use project_log::ProjectLog;
pub use scope::{ScopeError, ScopeRejection, ShellEnv, check_scope, effective_cwd, resolve_scope_dir};
