//! Shared types, errors, and the modification data model for the Reweave engine.
//!
//! This crate provides the foundational types used across all other Reweave crates:
//! - `ReweaveError` — unified error taxonomy
//! - `ProjectFile` — one scanned source file of the managed project
//! - `ModificationScope` / `ModificationChange` / `ModificationResult` — the
//!   request lifecycle shapes produced and consumed by the orchestrator
//! - `SessionContext` — per-session working state held under a cache TTL

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Unified error type for all Reweave subsystems.
#[derive(Debug, thiserror::Error)]
pub enum ReweaveError {
    // === Sandbox Errors ===
    #[error("Sandbox rejected path '{path}': {reason}")]
    SandboxViolation { path: String, reason: String },

    // === Oracle Errors ===
    #[error("Oracle {provider} returned HTTP {status}: {message}")]
    OracleHttp {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Oracle reply was unusable: {message}")]
    OracleReplyError { message: String },

    #[error("Authentication failed for oracle {provider}")]
    AuthError { provider: String },

    #[error("Request to oracle {provider} timed out after {timeout_ms}ms")]
    OracleTimeout { provider: String, timeout_ms: u64 },

    // === Classification Errors ===
    #[error("Classification ambiguous (confidence {confidence}): {message}")]
    ClassificationAmbiguity { confidence: f64, message: String },

    // === Session Errors ===
    #[error("Session setup failed: {0}")]
    SessionSetup(String),

    #[error("Modification run exceeded the {timeout_ms}ms deadline")]
    DeadlineExceeded { timeout_ms: u64 },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ReweaveError {
    /// Returns `true` if the error is scoped to one file or one oracle call
    /// and the surrounding orchestration should record it and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ReweaveError::SandboxViolation { .. }
                | ReweaveError::OracleHttp { .. }
                | ReweaveError::OracleReplyError { .. }
                | ReweaveError::OracleTimeout { .. }
                | ReweaveError::ClassificationAmbiguity { .. }
                | ReweaveError::Io(_)
        )
    }

    /// Returns `true` if the error invalidates the whole request. The
    /// orchestrator still flushes accumulated change records before failing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReweaveError::SessionSetup(_)
                | ReweaveError::AuthError { .. }
                | ReweaveError::DeadlineExceeded { .. }
        )
    }
}

/// A convenience alias for `Result<T, ReweaveError>`.
pub type Result<T> = std::result::Result<T, ReweaveError>;

// ---------------------------------------------------------------------------
// ProjectFile — one scanned source file of the managed project
// ---------------------------------------------------------------------------

/// A source file discovered by the project scanner.
///
/// Mutated in place on every successful write so the in-memory map stays a
/// faithful mirror of the tree between oracle calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    pub name: String,
    pub absolute_path: PathBuf,
    /// Path relative to the sandbox root, with forward slashes.
    pub relative_path: String,
    pub content: String,
    pub line_count: usize,
    pub size_bytes: u64,
    /// First few hundred characters, used in classification prompts.
    pub snippet: String,
    /// Component name inferred from the file stem (e.g. `Header` for `Header.jsx`).
    pub component_name: String,
    pub has_buttons: bool,
    pub has_signin: bool,
    pub is_main_file: bool,
}

impl ProjectFile {
    /// Refresh the derived fields after a successful write.
    pub fn update_content(&mut self, content: String) {
        self.line_count = content.lines().count();
        self.size_bytes = content.len() as u64;
        self.snippet = snippet_of(&content);
        self.content = content;
    }
}

/// Bounded snippet used in prompts and summaries.
pub fn snippet_of(content: &str) -> String {
    const SNIPPET_LEN: usize = 300;
    if content.len() <= SNIPPET_LEN {
        content.to_string()
    } else {
        let mut end = SNIPPET_LEN;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        content[..end].to_string()
    }
}

/// The in-memory file map keyed by sandbox-relative path.
pub type ProjectFileMap = HashMap<String, ProjectFile>;

// ---------------------------------------------------------------------------
// ModificationScope — one classification decision per request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationStrategy {
    FullFile,
    TargetedNodes,
    ComponentAddition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Component,
    Page,
}

impl EntityKind {
    /// Folder under the sandbox root where new files of this kind go.
    pub fn folder(&self) -> &'static str {
        match self {
            EntityKind::Component => "components",
            EntityKind::Page => "pages",
        }
    }
}

/// Produced once per request by the scope classifier, consumed immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationScope {
    pub strategy: ModificationStrategy,
    pub target_files: Vec<String>,
    pub reasoning: String,
    pub new_entity: Option<NewEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    pub kind: EntityKind,
}

// ---------------------------------------------------------------------------
// ModificationChange — append-only change log entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Modified,
    Created,
    Updated,
}

/// One entry of the per-session change log. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationChange {
    pub id: String,
    pub kind: ChangeKind,
    pub file: String,
    pub description: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ModificationChange {
    pub fn new(kind: ChangeKind, file: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            file: file.into(),
            description: description.into(),
            timestamp: chrono::Utc::now(),
            success: true,
            detail: None,
        }
    }

    pub fn failed(mut self, detail: impl Into<String>) -> Self {
        self.success = false;
        self.detail = Some(detail.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// SessionContext — per-session working state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub build_id: String,
    pub working_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<String>,
    pub last_activity: chrono::DateTime<chrono::Utc>,
}

impl SessionContext {
    pub fn new(build_id: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_id: build_id.into(),
            working_dir: working_dir.into(),
            last_summary: None,
            last_activity: chrono::Utc::now(),
        }
    }

    /// Sliding-expiration touch; called on every cache access.
    pub fn touch(&mut self) {
        self.last_activity = chrono::Utc::now();
    }
}

// ---------------------------------------------------------------------------
// ModificationResult — what downstream consumers receive
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationResult {
    pub success: bool,
    pub files_changed: Vec<String>,
    pub strategy_used: ModificationStrategy,
    pub reasoning: String,
    pub change_log: Vec<ModificationChange>,
}

impl ModificationResult {
    /// A result is successful when at least one file changed successfully;
    /// partial per-file failures stay enumerated in `change_log`.
    pub fn from_changes(
        strategy: ModificationStrategy,
        reasoning: impl Into<String>,
        change_log: Vec<ModificationChange>,
    ) -> Self {
        let files_changed: Vec<String> = change_log
            .iter()
            .filter(|c| c.success)
            .map(|c| c.file.clone())
            .collect();
        Self {
            success: !files_changed.is_empty(),
            files_changed,
            strategy_used: strategy,
            reasoning: reasoning.into(),
            change_log,
        }
    }

    /// Total failure that still carries the partial change log.
    pub fn failed(
        strategy: ModificationStrategy,
        reasoning: impl Into<String>,
        change_log: Vec<ModificationChange>,
    ) -> Self {
        Self {
            success: false,
            files_changed: Vec::new(),
            strategy_used: strategy,
            reasoning: reasoning.into(),
            change_log,
        }
    }
}
