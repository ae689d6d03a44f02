//! Trust level and autonomy scope: the process-wide approval dial.
//!
//! [`AutonomySettings`] is shared (behind an `Arc`) between the agent and
//! whatever front end mutates it. The approval policy takes a
//! [`AutonomySnapshot`] on every invocation, so a change made between two
//! rounds of an in-flight turn is seen by the next round.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// How much tool execution requires human approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Only read-only commands run without asking.
    Cautious,
    /// Safe commands, configured patterns and scoped work run without asking.
    #[default]
    Balanced,
    /// Everything runs without asking.
    Autonomous,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cautious => "cautious",
            Self::Balanced => "balanced",
            Self::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cautious" => Ok(Self::Cautious),
            "balanced" => Ok(Self::Balanced),
            "autonomous" => Ok(Self::Autonomous),
            other => Err(format!(
                "unknown trust level '{other}' (expected cautious, balanced or autonomous)"
            )),
        }
    }
}

/// A directory inside which balanced trust auto-approves commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomyScope {
    pub directory: PathBuf,
    pub active: bool,
}

impl AutonomyScope {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            active: true,
        }
    }
}

/// A consistent, owned view of the settings at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutonomySnapshot {
    pub trust_level: TrustLevel,
    pub scope: Option<AutonomyScope>,
    pub auto_approve_patterns: Vec<String>,
    pub notify_on_pending: bool,
}

impl AutonomySnapshot {
    /// The scope directory, if a scope is set and active.
    pub fn active_scope(&self) -> Option<&Path> {
        self.scope
            .as_ref()
            .filter(|s| s.active)
            .map(|s| s.directory.as_path())
    }
}

/// Thread-safe, mutable autonomy settings.
#[derive(Debug, Default)]
pub struct AutonomySettings {
    inner: RwLock<AutonomySnapshot>,
}

impl AutonomySettings {
    pub fn new(
        trust_level: TrustLevel,
        auto_approve_patterns: Vec<String>,
        notify_on_pending: bool,
    ) -> Self {
        Self {
            inner: RwLock::new(AutonomySnapshot {
                trust_level,
                scope: None,
                auto_approve_patterns,
                notify_on_pending,
            }),
        }
    }

    pub fn snapshot(&self) -> AutonomySnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn trust_level(&self) -> TrustLevel {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .trust_level
    }

    pub fn set_trust_level(&self, level: TrustLevel) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .trust_level = level;
        tracing::info!(trust_level = %level, "Trust level changed");
    }

    /// Activate an autonomy scope rooted at `directory`.
    pub fn activate_scope(&self, directory: impl Into<PathBuf>) {
        let scope = AutonomyScope::new(directory);
        tracing::info!(directory = %scope.directory.display(), "Autonomy scope activated");
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .scope = Some(scope);
    }

    /// Deactivate the scope, keeping its directory for display.
    pub fn deactivate_scope(&self) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(scope) = guard.scope.as_mut() {
            scope.active = false;
            tracing::info!(directory = %scope.directory.display(), "Autonomy scope deactivated");
        }
    }

    pub fn set_auto_approve_patterns(&self, patterns: Vec<String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .auto_approve_patterns = patterns;
    }

    pub fn set_notify_on_pending(&self, enabled: bool) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .notify_on_pending = enabled;
    }
}
