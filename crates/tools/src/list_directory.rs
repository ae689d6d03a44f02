//! Directory listing tool: flat listing or a depth-limited tree.

use std::path::Path;

use async_trait::async_trait;
use bonza_core::error::ToolError;
use bonza_core::tool::{Tool, ToolResult};

use crate::util::{format_file_size, resolve_path};

const FLAT_LIMIT: usize = 100;
const TREE_LIMIT: usize = 50;

pub struct ListDirectoryTool;

struct Entry {
    name: String,
    is_dir: bool,
    size: u64,
}

/// Directories first, then case-insensitive by name.
fn sorted_entries(dir: &Path) -> std::io::Result<Vec<Entry>> {
    let mut entries: Vec<Entry> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| {
            let meta = e.metadata().ok();
            Entry {
                name: e.file_name().to_string_lossy().into_owned(),
                is_dir: meta.as_ref().is_some_and(|m| m.is_dir()),
                size: meta.map(|m| m.len()).unwrap_or(0),
            }
        })
        .collect();
    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(entries)
}

fn flat_list(dir: &Path) -> std::io::Result<String> {
    let entries = sorted_entries(dir)?;
    let mut lines = vec![format!("📁 {}\n", dir.display())];

    for entry in entries.iter().take(FLAT_LIMIT) {
        if entry.is_dir {
            let count = std::fs::read_dir(dir.join(&entry.name))
                .map(|rd| rd.count())
                .unwrap_or(0);
            lines.push(format!("  📂 {}/ ({count} items)", entry.name));
        } else {
            lines.push(format!("  📄 {} ({})", entry.name, format_file_size(entry.size)));
        }
    }

    if entries.len() > FLAT_LIMIT {
        lines.push(format!("  ... and {} more", entries.len() - FLAT_LIMIT));
    }

    Ok(lines.join("\n"))
}

fn tree(dir: &Path, prefix: &str, depth: usize, max_depth: usize, out: &mut Vec<String>) {
    if depth > max_depth {
        return;
    }
    let Ok(entries) = sorted_entries(dir) else {
        return;
    };

    let shown = entries.len().min(TREE_LIMIT);
    for (i, entry) in entries.iter().take(TREE_LIMIT).enumerate() {
        let is_last = i + 1 == shown;
        let connector = if is_last { "└── " } else { "├── " };
        if entry.is_dir {
            out.push(format!("{prefix}{connector}📂 {}/", entry.name));
            let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
            tree(&dir.join(&entry.name), &child_prefix, depth + 1, max_depth, out);
        } else {
            out.push(format!(
                "{prefix}{connector}📄 {} ({})",
                entry.name,
                format_file_size(entry.size)
            ));
        }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and subdirectories in a directory. Shows file sizes and types. Like 'ls -la'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the directory to list"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "If true, list recursively (tree view). Default: false"
                },
                "max_depth": {
                    "type": "integer",
                    "description": "Max depth for recursive listing (default: 3)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let raw = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let dir = resolve_path(raw);
        let recursive = arguments["recursive"].as_bool().unwrap_or(false);
        let max_depth = arguments["max_depth"].as_u64().unwrap_or(3) as usize;

        if !dir.exists() {
            return Ok(ToolResult::failed(format!(
                "❌ Directory not found: {}",
                dir.display()
            )));
        }
        if !dir.is_dir() {
            return Ok(ToolResult::failed(format!(
                "❌ Not a directory: {}",
                dir.display()
            )));
        }

        let listing = tokio::task::spawn_blocking(move || {
            if recursive {
                let mut out = vec![format!("📁 {}", dir.display())];
                tree(&dir, "", 0, max_depth, &mut out);
                Ok(out.join("\n"))
            } else {
                flat_list(&dir)
            }
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "list_directory".into(),
            reason: e.to_string(),
        })?;

        match listing {
            Ok(text) => Ok(ToolResult::ok(text)),
            Err(e) => Ok(ToolResult::failed(format!("❌ Cannot list directory: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/nested/deep.rs"), "").unwrap();
        dir
    }

    #[tokio::test]
    async fn flat_listing_puts_directories_first() {
        let dir = fixture();
        let result = ListDirectoryTool
            .execute(serde_json::json!({ "path": dir.path().to_str().unwrap() }))
            .await
            .unwrap();

        assert!(result.success);
        let src = result.output.find("📂 src/").unwrap();
        let readme = result.output.find("📄 README.md").unwrap();
        assert!(src < readme);
        assert!(result.output.contains("(2 items)"));
    }

    #[tokio::test]
    async fn tree_respects_depth() {
        let dir = fixture();
        let result = ListDirectoryTool
            .execute(serde_json::json!({
                "path": dir.path().to_str().unwrap(),
                "recursive": true,
                "max_depth": 1
            }))
            .await
            .unwrap();

        assert!(result.output.contains("lib.rs"));
        assert!(result.output.contains("📂 nested/"));
        assert!(!result.output.contains("deep.rs"));
    }

    #[tokio::test]
    async fn missing_directory() {
        let result = ListDirectoryTool
            .execute(serde_json::json!({ "path": "/definitely/not/here" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("Directory not found"));
    }
}
