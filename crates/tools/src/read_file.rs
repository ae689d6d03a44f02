//! File read tool: numbered file contents, optionally a line range.

use async_trait::async_trait;
use bonza_core::error::ToolError;
use bonza_core::tool::{Tool, ToolResult};

use crate::util::{format_file_size, resolve_path};

/// Files larger than this are cut when read whole.
const MAX_READ_CHARS: usize = 100_000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Returns the file text with line numbers. For large files, returns only the first ~100KB."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "start_line": {
                    "type": "integer",
                    "description": "Optional start line (1-indexed)"
                },
                "end_line": {
                    "type": "integer",
                    "description": "Optional end line (1-indexed, inclusive)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let raw = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let path = resolve_path(raw);

        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                return Ok(ToolResult::failed(format!("❌ Not a file: {}", path.display())));
            }
            Err(_) => {
                return Ok(ToolResult::failed(format!(
                    "❌ File not found: {}",
                    path.display()
                )));
            }
        };

        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) => return Ok(ToolResult::failed(format!("❌ Error reading file: {e}"))),
        };
        let content = String::from_utf8_lossy(&bytes);
        let total_lines = content.split('\n').count();

        let start_line = arguments["start_line"].as_u64().map(|n| n as usize);
        let end_line = arguments["end_line"].as_u64().map(|n| n as usize);

        let (first, lines): (usize, Vec<&str>) = if start_line.is_some() || end_line.is_some() {
            let start = start_line.unwrap_or(1).max(1) - 1;
            let end = end_line.unwrap_or(total_lines).min(total_lines);
            let lines = content
                .split('\n')
                .skip(start)
                .take(end.saturating_sub(start))
                .collect();
            (start + 1, lines)
        } else {
            let body = bonza_core::util::truncate_chars(&content, MAX_READ_CHARS);
            if body.len() < content.len() {
                tracing::warn!(path = %path.display(), size = meta.len(), "Large file, truncating");
            }
            (1, body.split('\n').collect())
        };

        let numbered: Vec<String> = lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:4} | {line}", i + first))
            .collect();

        Ok(ToolResult::ok(format!(
            "📄 {} ({total_lines} lines, {})\n{}",
            path.display(),
            format_file_size(meta.len()),
            numbered.join("\n")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition() {
        let tool = ReadFileTool;
        assert_eq!(tool.name(), "read_file");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
        assert!(schema["properties"]["path"].is_object());
    }

    #[tokio::test]
    async fn read_existing_file_with_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("test.txt");
        std::fs::write(&file_path, "first\nsecond\nthird").unwrap();

        let result = ReadFileTool
            .execute(serde_json::json!({ "path": file_path.to_str().unwrap() }))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("(3 lines"));
        assert!(result.output.contains("   1 | first"));
        assert!(result.output.contains("   3 | third"));
    }

    #[tokio::test]
    async fn read_line_range() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("range.txt");
        std::fs::write(&file_path, "a\nb\nc\nd").unwrap();

        let result = ReadFileTool
            .execute(serde_json::json!({
                "path": file_path.to_str().unwrap(),
                "start_line": 2,
                "end_line": 3
            }))
            .await
            .unwrap();

        assert!(result.output.contains("   2 | b"));
        assert!(result.output.contains("   3 | c"));
        assert!(!result.output.contains("| a"));
        assert!(!result.output.contains("| d"));
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let result = ReadFileTool
            .execute(serde_json::json!({
                "path": "/tmp/bonza_test_nonexistent_file_12345.txt"
            }))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.output.contains("File not found"));
    }

    #[tokio::test]
    async fn directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReadFileTool
            .execute(serde_json::json!({ "path": dir.path().to_str().unwrap() }))
            .await
            .unwrap();
        assert!(result.output.contains("Not a file"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let result = ReadFileTool.execute(serde_json::json!({})).await;
        assert!(result.is_err());
    }
}
