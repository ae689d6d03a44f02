//! Project action log: a markdown trail of every tool call made while an
//! autonomy scope is active, written to `<scope>/.bonza/log.md`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use bonza_core::util::truncate_chars;
use chrono::Local;
use serde_json::Value;

const LOG_DIR: &str = ".bonza";
const LOG_FILE: &str = "log.md";

/// Appends entries to the action log of one scope directory.
#[derive(Debug, Clone)]
pub struct ProjectLog {
    scope: PathBuf,
}

impl ProjectLog {
    pub fn new(scope: impl Into<PathBuf>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.scope.join(LOG_DIR).join(LOG_FILE)
    }

    /// Append one entry. Failures are logged at debug level and dropped.
    pub fn append(&self, tool_name: &str, arguments: &Value, result: &str) {
        if let Err(e) = self.try_append(tool_name, arguments, result) {
            tracing::debug!(error = %e, path = %self.path().display(), "Project log write failed");
        }
    }

    fn try_append(&self, tool_name: &str, arguments: &Value, result: &str) -> std::io::Result<()> {
        let dir = self.scope.join(LOG_DIR);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(LOG_FILE);

        let is_new = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if is_new {
            write!(
                file,
                "# Bonza Project Log\n\nAuto-generated action log for `{}`\n\n---\n",
                self.scope.display()
            )?;
        }

        let result_preview = if result.is_empty() {
            "(no output)"
        } else {
            truncate_chars(result, 500)
        };

        write!(
            file,
            "\n### {} — `{}`\n**Args**: `{}`\n**Result**: {}\n---\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            tool_name,
            display_args(tool_name, arguments),
            result_preview
        )
    }
}

/// Concise argument summary for a log entry.
fn display_args(tool_name: &str, arguments: &Value) -> String {
    let str_arg = |key: &str| arguments.get(key).and_then(Value::as_str).unwrap_or("");
    match tool_name {
        "execute_terminal" => str_arg("command").to_string(),
        "write_file" => format!(
            "path={}, {} chars",
            str_arg("path"),
            str_arg("content").chars().count()
        ),
        _ => truncate_chars(&arguments.to_string(), 200).to_string(),
    }
}
