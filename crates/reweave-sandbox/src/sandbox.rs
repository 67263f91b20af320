use std::path::{Path, PathBuf};
use std::sync::Mutex;

use reweave_types::{Result, ReweaveError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Boundary policy for a sandbox instance. The validation algorithm is the
/// same for both levels; only the boundary and pattern sets differ.
#[derive(Debug, Clone)]
pub enum SecurityLevel {
    /// Writes confined to an enumerated allow-list of top-level
    /// subdirectories under the root.
    Strict { allowed_roots: Vec<String> },
    /// Writes confined only to the project root.
    Relaxed,
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub level: SecurityLevel,
    /// File extensions accepted for writes; `None` disables the check.
    pub allowed_extensions: Option<Vec<String>>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            level: SecurityLevel::Relaxed,
            allowed_extensions: Some(
                ["js", "jsx", "ts", "tsx", "css", "html", "json", "svg", "md"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
        }
    }
}

impl SandboxConfig {
    pub fn strict(allowed_roots: Vec<String>) -> Self {
        Self {
            level: SecurityLevel::Strict { allowed_roots },
            ..Self::default()
        }
    }

    pub fn without_extension_check(mut self) -> Self {
        self.allowed_extensions = None;
        self
    }
}

// ---------------------------------------------------------------------------
// Validation result
// ---------------------------------------------------------------------------

/// Outcome of structural path validation. A typed value, never an error.
#[derive(Debug, Clone)]
pub struct Validation {
    pub is_valid: bool,
    /// Absolute path under the root; present only when valid.
    pub normalized: Option<PathBuf>,
    pub error: Option<String>,
}

impl Validation {
    fn accept(normalized: PathBuf) -> Self {
        Self {
            is_valid: true,
            normalized: Some(normalized),
            error: None,
        }
    }

    fn reject(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            normalized: None,
            error: Some(error.into()),
        }
    }
}

/// One audited sandbox attempt; appended regardless of outcome.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub path: String,
    pub accepted: bool,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// PathSandbox
// ---------------------------------------------------------------------------

/// Validates and contains every filesystem path to one authorized root.
/// Instantiated per project root; no cross-instance shared state.
pub struct PathSandbox {
    root: PathBuf,
    config: SandboxConfig,
    audit: Mutex<Vec<AuditEntry>>,
}

/// Deny-list applied independently of structural validation. Matching is on
/// the normalized (forward-slash) form of the raw input.
const SUSPICIOUS_PATTERNS: &[(&str, &str)] = &[
    ("..", "parent traversal marker"),
    ("~", "home directory reference"),
    ("node_modules", "dependency directory"),
    (".git", "version control directory"),
    (".svn", "version control directory"),
    ("package-lock.json", "lockfile"),
    ("yarn.lock", "lockfile"),
    ("pnpm-lock.yaml", "lockfile"),
    (".env", "environment file"),
    (".ssh", "credential directory"),
    ("id_rsa", "private key"),
    ("/etc/", "system directory"),
    ("passwd", "system credential file"),
];

impl PathSandbox {
    pub fn new(root: impl Into<PathBuf>, config: SandboxConfig) -> Self {
        Self {
            root: root.into(),
            config,
            audit: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Structural validation: separator normalization, resolution against
    /// the root, lexical traversal rejection, boundary containment, and the
    /// optional extension allow-list. Pure; performs no I/O and never errors.
    pub fn validate(&self, path: &str) -> Validation {
        let normalized_input = path.replace('\\', "/");
        let root_str = self.root.to_string_lossy().replace('\\', "/");

        // Absolute inputs are accepted only when they already resolve under
        // the root; anything else cannot be contained. The prefix match must
        // land on a separator boundary so sibling directories sharing the
        // root's name as a prefix do not slip through.
        let under_root = normalized_input
            .strip_prefix(&root_str)
            .filter(|rest| rest.starts_with('/'))
            .map(|rest| rest.trim_start_matches('/').to_string());

        let relative = if let Some(rest) = under_root {
            rest
        } else if is_absolute_path(&normalized_input) {
            return Validation::reject(format!(
                "absolute path escapes the sandbox root: {normalized_input}"
            ));
        } else {
            normalized_input.clone()
        };

        let mut segments: Vec<&str> = Vec::new();
        for segment in relative.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Validation::reject("parent traversal detected");
                }
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Validation::reject("path resolves to the sandbox root itself");
        }

        if let SecurityLevel::Strict { ref allowed_roots } = self.config.level {
            let first = segments[0];
            let is_leaf = segments.len() == 1;
            if is_leaf || !allowed_roots.iter().any(|r| r == first) {
                return Validation::reject(format!(
                    "'{first}' is not within the allowed subdirectories"
                ));
            }
        }

        if let Some(ref allowed) = self.config.allowed_extensions {
            let leaf = segments[segments.len() - 1];
            let ext = leaf.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)) {
                return Validation::reject(format!("extension '{ext}' is not allowed"));
            }
        }

        let mut resolved = self.root.clone();
        for segment in &segments {
            resolved.push(segment);
        }
        Validation::accept(resolved)
    }

    /// Independent deny-list check, applied even to structurally valid
    /// paths. Returns the matched reason, or `None` when clean.
    pub fn detect_suspicious(&self, path: &str) -> Option<&'static str> {
        let normalized = path.replace('\\', "/");
        if is_absolute_path(&normalized) {
            return Some("absolute path");
        }
        let lower = normalized.to_ascii_lowercase();
        for (pattern, reason) in SUSPICIOUS_PATTERNS {
            if lower.contains(pattern) {
                return Some(reason);
            }
        }
        None
    }

    /// Validate + suspicious-check + recursive directory creation + write.
    /// I/O happens only when both checks pass; every attempt is audited,
    /// including I/O failures.
    pub async fn write(&self, path: &str, content: &str) -> Result<PathBuf> {
        let validation = self.validate(path);
        if !validation.is_valid {
            let reason = validation.error.unwrap_or_else(|| "invalid path".into());
            self.record(path, false, Some(reason.clone()));
            tracing::warn!(path, %reason, "sandbox rejected write");
            return Err(ReweaveError::SandboxViolation {
                path: path.to_string(),
                reason,
            });
        }

        if let Some(reason) = self.detect_suspicious(path) {
            self.record(path, false, Some(reason.to_string()));
            tracing::warn!(path, reason, "sandbox flagged suspicious write");
            return Err(ReweaveError::SandboxViolation {
                path: path.to_string(),
                reason: reason.to_string(),
            });
        }

        let resolved = validation
            .normalized
            .unwrap_or_else(|| self.root.join(path));
        if let Err(e) = persist(&resolved, content).await {
            self.record(path, false, Some(e.to_string()));
            tracing::warn!(path, error = %e, "sandbox write failed");
            return Err(e.into());
        }

        self.record(path, true, None);
        tracing::debug!(path, bytes = content.len(), "sandbox write");
        Ok(resolved)
    }

    /// Validated read. Analysis reads carry no suspicious-check since they
    /// cannot mutate anything, but containment still applies.
    pub async fn read(&self, path: &str) -> Result<String> {
        let validation = self.validate(path);
        let Some(resolved) = validation.normalized else {
            let reason = validation.error.unwrap_or_else(|| "invalid path".into());
            self.record(path, false, Some(reason.clone()));
            return Err(ReweaveError::SandboxViolation {
                path: path.to_string(),
                reason,
            });
        };
        Ok(tokio::fs::read_to_string(&resolved).await?)
    }

    /// Snapshot of the audit log.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn record(&self, path: &str, accepted: bool, reason: Option<String>) {
        if let Ok(mut log) = self.audit.lock() {
            log.push(AuditEntry {
                timestamp: chrono::Utc::now(),
                path: path.to_string(),
                accepted,
                reason,
            });
        }
    }
}

async fn persist(resolved: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = resolved.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(resolved, content).await
}

/// Absolute OS path: leading slash or a Windows drive prefix.
fn is_absolute_path(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
