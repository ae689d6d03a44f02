//! Autonomy scope resolution.
//!
//! A command is inside the scope when every step of it runs in a directory
//! under the scope root (following `cd` steps and subshell parentheses of a
//! compound command) and every path-like word it mentions resolves there
//! too. Paths are compared component-wise after lexical normalization; the
//! filesystem is not consulted, so the check is deterministic for a given
//! input.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex_lite::Regex;

static COMMAND_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&&|\|\||[;|\n]").expect("command separator regex must compile")
});

/// Error returned when a scope directory cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("Scope directory '{path}' does not exist")]
    NotFound { path: String },

    #[error("Scope path '{path}' is not a directory")]
    NotADirectory { path: String },

    #[error("Failed to canonicalize scope '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Why a command was kept out of the scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRejection {
    /// The effective working directory is outside the scope root.
    WorkingDirOutside { cwd: PathBuf },
    /// The command names a path that resolves outside the scope root.
    PathOutside { path: PathBuf },
    /// A word depends on expansion (`$VAR`, backticks, `~user`) and cannot
    /// be resolved lexically.
    Unresolvable { word: String },
}

/// Where a command starts: its explicit working directory (if any), the
/// process directory otherwise, and the home directory for `~`.
#[derive(Debug, Clone)]
pub struct ShellEnv<'a> {
    pub cwd: &'a Path,
    pub home: Option<&'a Path>,
}

/// Resolve a user-supplied scope directory to an existing, canonical path.
pub fn resolve_scope_dir(raw: &str) -> Result<PathBuf, ScopeError> {
    let expanded = expand_tilde(raw.trim());
    let path = Path::new(&expanded);

    if !path.exists() {
        return Err(ScopeError::NotFound { path: raw.into() });
    }
    if !path.is_dir() {
        return Err(ScopeError::NotADirectory { path: raw.into() });
    }

    path.canonicalize()
        .map_err(|e| ScopeError::CanonicalizeFailed {
            path: raw.into(),
            reason: e.to_string(),
        })
}

/// The directory `cmd` ends up running in, following `cd` steps split on
/// `&&`, `||`, `;`, `|` and newlines.
pub fn effective_cwd(cmd: &str, working_dir: Option<&str>, env: &ShellEnv<'_>) -> PathBuf {
    walk(cmd, working_dir, env).1
}

/// Check that `cmd` stays inside `scope`.
pub fn check_scope(
    cmd: &str,
    working_dir: Option<&str>,
    scope: &Path,
    env: &ShellEnv<'_>,
) -> Result<(), ScopeRejection> {
    let root = resolve(env.cwd, &scope.to_string_lossy(), env.home);
    let (steps, last) = walk(cmd, working_dir, env);

    for step in &steps {
        if !step.cwd.starts_with(&root) {
            return Err(ScopeRejection::WorkingDirOutside {
                cwd: step.cwd.clone(),
            });
        }
        for word in step.words.split_whitespace() {
            if let Some(path) = path_operand(word, &step.cwd, env)?
                && !path.starts_with(&root)
            {
                return Err(ScopeRejection::PathOutside { path });
            }
        }
    }

    if !last.starts_with(&root) {
        return Err(ScopeRejection::WorkingDirOutside { cwd: last });
    }
    Ok(())
}

/// One simple command of a compound command and the directory it runs in.
/// A `cd` step has no words; its `cwd` is the directory it changed to.
#[derive(Debug)]
struct Step<'c> {
    cwd: PathBuf,
    words: &'c str,
}

/// Split `cmd` into steps, tracking `cd` and restoring the directory when a
/// `( ... )` subshell closes. Returns the steps and the final directory.
fn walk<'c>(
    cmd: &'c str,
    working_dir: Option<&str>,
    env: &ShellEnv<'_>,
) -> (Vec<Step<'c>>, PathBuf) {
    let mut cwd = match working_dir {
        Some(dir) if !dir.trim().is_empty() => resolve(env.cwd, dir.trim(), env.home),
        _ => normalize(env.cwd),
    };
    let mut subshells: Vec<PathBuf> = Vec::new();
    let mut steps = Vec::new();

    for part in COMMAND_SEPARATOR.split(cmd) {
        let mut body = part.trim();
        while let Some(rest) = body.strip_prefix('(') {
            subshells.push(cwd.clone());
            body = rest.trim_start();
        }
        let mut closes = 0;
        while let Some(rest) = body.strip_suffix(')') {
            closes += 1;
            body = rest.trim_end();
        }

        if let Some(target) = cd_target(body) {
            cwd = match target {
                Some(target) => resolve(&cwd, target, env.home),
                None => env.home.map(normalize).unwrap_or_else(|| cwd.clone()),
            };
            steps.push(Step {
                cwd: cwd.clone(),
                words: "",
            });
        } else if !body.is_empty() {
            steps.push(Step {
                cwd: cwd.clone(),
                words: body,
            });
        }

        for _ in 0..closes {
            if let Some(outer) = subshells.pop() {
                cwd = outer;
            }
        }
    }

    (steps, cwd)
}

/// `Some(target)` for `cd <target>`, `Some(None)` for a bare `cd`.
fn cd_target(body: &str) -> Option<Option<&str>> {
    if body == "cd" {
        return Some(None);
    }
    let target = body.strip_prefix("cd ")?.trim();
    Some(Some(target.trim_matches('"').trim_matches('\'')))
}

/// The path a word refers to, when it looks like one: absolute, `~`-rooted
/// or climbing with `..`. For `--flag=value` and `VAR=value` words the value
/// is checked.
fn path_operand(
    word: &str,
    cwd: &Path,
    env: &ShellEnv<'_>,
) -> Result<Option<PathBuf>, ScopeRejection> {
    let word = word.trim_matches(|c: char| matches!(c, '"' | '\'' | '(' | ')'));
    let value = word.split_once('=').map_or(word, |(_, value)| value);

    if value.contains('$') || value.contains('`') {
        return Err(ScopeRejection::Unresolvable { word: word.into() });
    }
    if let Some(rest) = value.strip_prefix('~')
        && !(rest.is_empty() || rest.starts_with('/'))
    {
        return Err(ScopeRejection::Unresolvable { word: word.into() });
    }

    let climbs = Path::new(value)
        .components()
        .any(|c| c == Component::ParentDir);
    if value.starts_with('/') || value.starts_with('~') || climbs {
        Ok(Some(resolve(cwd, value, env.home)))
    } else {
        Ok(None)
    }
}

/// Resolve `target` against `base`: absolute paths replace it, `~` expands
/// to `home`, anything else is joined.
fn resolve(base: &Path, target: &str, home: Option<&Path>) -> PathBuf {
    let joined = match (target.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => base.join(target),
    };
    normalize(&joined)
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home.to_string_lossy(), 1);
    }
    path.to_string()
}

/// The current user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}
