//! Built-in tool implementations for Bonza.
//!
//! Tools give the agent the ability to interact with the machine it runs
//! on: run shell commands, read/write files, list directories, and run
//! code snippets. Approval is not their concern; the agent decides whether
//! a call may run before it reaches a tool.

pub mod code_runner;
pub mod list_directory;
pub mod read_file;
pub mod terminal;
pub mod util;
pub mod write_file;

use bonza_core::tool::ToolRegistry;

pub use code_runner::CodeRunnerTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use terminal::TerminalTool;
pub use write_file::WriteFileTool;

/// Create a default tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(TerminalTool::default()));
    registry.register(Box::new(ReadFileTool));
    registry.register(Box::new(WriteFileTool));
    registry.register(Box::new(ListDirectoryTool));
    registry.register(Box::new(CodeRunnerTool));
    registry
}
