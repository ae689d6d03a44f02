//! Code runner tool: execute Python, JavaScript or Bash snippets in a
//! subprocess with a timeout.

use std::time::Duration;

use async_trait::async_trait;
use bonza_core::error::ToolError;
use bonza_core::tool::{Tool, ToolResult};
use tokio::process::Command;

use crate::util::cap_output;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const MAX_OUTPUT_CHARS: usize = 8000;

/// Interpreter and inline-code flag per language.
fn runner(language: &str) -> Option<(&'static str, &'static str)> {
    match language {
        "python" => Some(("python3", "-c")),
        "javascript" => Some(("node", "-e")),
        "bash" => Some(("bash", "-c")),
        _ => None,
    }
}

pub struct CodeRunnerTool;

#[async_trait]
impl Tool for CodeRunnerTool {
    fn name(&self) -> &str {
        "run_code"
    }

    fn description(&self) -> &str {
        "Execute a code snippet in a subprocess. Supports Python, JavaScript (Node.js), and Bash. Returns stdout/stderr. Use for testing code, running calculations, or validating logic."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The code to execute"
                },
                "language": {
                    "type": "string",
                    "enum": ["python", "javascript", "bash"],
                    "description": "Programming language (default: python)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 15)"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let code = arguments["code"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'code' argument".into()))?;
        let language = arguments["language"].as_str().unwrap_or("python");
        let timeout_secs = arguments["timeout"].as_u64().unwrap_or(DEFAULT_TIMEOUT_SECS);

        let Some((interpreter, flag)) = runner(language) else {
            return Ok(ToolResult::failed(format!(
                "❌ Unsupported language: {language}. Use: python, javascript, bash"
            )));
        };

        tracing::info!(language, chars = code.len(), timeout_secs, "Running code snippet");

        let mut cmd = Command::new(interpreter);
        cmd.args([flag, code])
            .current_dir(std::env::temp_dir())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .kill_on_drop(true);

        let output =
            match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(ToolResult::failed(format!(
                        "❌ Interpreter not found: {interpreter}"
                    )));
                }
                Ok(Err(e)) => {
                    return Ok(ToolResult::failed(format!("❌ Error running code: {e}")));
                }
                Err(_) => {
                    return Ok(ToolResult::failed(format!(
                        "⏰ Code timed out after {timeout_secs}s"
                    )));
                }
            };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut text = stdout.to_string();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n--- stderr ---\n");
            }
            text.push_str(&stderr);
        }
        let mut text = cap_output(&text, MAX_OUTPUT_CHARS);

        let success = output.status.success();
        if !success {
            text = format!("Exit code: {}\n{text}", output.status.code().unwrap_or(-1));
        }

        let trimmed = text.trim();
        Ok(ToolResult {
            success,
            output: if trimmed.is_empty() {
                "(no output)".into()
            } else {
                trimmed.to_string()
            },
        })
    }
}
