//! Terminal tool: execute shell commands.
//!
//! Approval is decided before the call reaches this tool; the tool itself
//! only bounds run time and output size.

use std::time::Duration;

use async_trait::async_trait;
use bonza_core::error::ToolError;
use bonza_core::tool::{Tool, ToolResult};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::util::{cap_output, resolve_path};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_OUTPUT_CHARS: usize = 10_000;

/// Execute shell commands with a timeout.
pub struct TerminalTool {
    timeout: Duration,
}

impl TerminalTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TerminalTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

#[async_trait]
impl Tool for TerminalTool {
    fn name(&self) -> &str {
        "execute_terminal"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout/stderr. Use this for running programs, checking files, git operations, installing packages, etc."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "working_directory": {
                    "type": "string",
                    "description": "Directory to run the command in (default: current directory)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = arguments["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;

        debug!(command = %command, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);

        if let Some(dir) = arguments["working_directory"].as_str()
            && !dir.trim().is_empty()
        {
            let dir = resolve_path(dir);
            if !dir.is_dir() {
                return Ok(ToolResult::failed(format!(
                    "❌ Working directory not found: {}",
                    dir.display()
                )));
            }
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| ToolError::ExecutionFailed {
                tool_name: "execute_terminal".into(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Ok(ToolResult::failed(format!(
                    "⏰ Command timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let success = output.status.success();

        let result_text = if success {
            if stderr.is_empty() {
                stdout.to_string()
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            }
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            format!("[exit code: {code}]\n{stdout}\n{stderr}")
        };

        let trimmed = result_text.trim();
        let text = if trimmed.is_empty() {
            "(no output)".to_string()
        } else {
            cap_output(trimmed, MAX_OUTPUT_CHARS)
        };

        Ok(ToolResult { success, output: text })
    }
}
