//! Helpers shared by the file and process tools.

use std::path::{Path, PathBuf};

use bonza_core::util::truncate_chars;

/// Expand a leading `~` and make the path absolute against the process
/// working directory.
pub fn resolve_path(raw: &str) -> PathBuf {
    let raw = raw.trim();
    let expanded = match (raw.strip_prefix('~'), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            Path::new(&home).join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(raw),
    };

    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    }
}

/// Human-readable file size.
pub fn format_file_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

/// Cap process output, marking the cut.
pub fn cap_output(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{cut}\n... (truncated)")
    } else {
        text.to_string()
    }
}
