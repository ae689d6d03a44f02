//! File write tool: write or create files.

use async_trait::async_trait;
use bonza_core::error::ToolError;
use bonza_core::tool::{Tool, ToolResult};

use crate::util::{format_file_size, resolve_path};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file and any parent directories if they don't exist. Overwrites existing content."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let raw = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let path = resolve_path(raw);

        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failed(format!("❌ Error writing file: {e}")));
        }

        match tokio::fs::write(&path, content).await {
            Ok(()) => Ok(ToolResult::ok(format!(
                "✅ Written {} to {}",
                format_file_size(content.len() as u64),
                path.display()
            ))),
            Err(e) => Ok(ToolResult::failed(format!("❌ Error writing file: {e}"))),
        }
    }
}
