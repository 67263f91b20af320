use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;

use crate::sandbox::PathSandbox;
use reweave_types::{snippet_of, ProjectFile, ProjectFileMap, Result, ReweaveError};

/// Directories never descended into during a scan.
const IGNORED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build", ".next", "coverage"];

/// File patterns included in the project map.
const SOURCE_GLOBS: &[&str] = &["*.js", "*.jsx", "*.ts", "*.tsx", "*.html", "*.css"];

/// Relative paths treated as the composition root, in preference order.
const MAIN_FILE_CANDIDATES: &[&str] = &[
    "src/App.jsx",
    "src/App.tsx",
    "src/App.js",
    "App.jsx",
    "src/main.jsx",
    "src/index.jsx",
    "index.html",
];

/// Vocabulary used for the `has_signin` flag.
const SIGNIN_PATTERN: &str = r"(?i)\b(sign\s*in|sign\s*up|sign\s*out|log\s*in|log\s*out|login|logout|signin)\b";

/// Walk the sandbox root and build the in-memory file map keyed by
/// sandbox-relative path. Unreadable files are skipped with a warning, not
/// an error; the map mirrors whatever the tree currently holds.
pub async fn scan_project(sandbox: &PathSandbox) -> Result<ProjectFileMap> {
    let glob_set = source_glob_set()?;
    let signin = Regex::new(SIGNIN_PATTERN)
        .map_err(|e| ReweaveError::Other(format!("sign-in pattern failed to compile: {e}")))?;

    let mut paths = Vec::new();
    collect_source_files(sandbox.root(), sandbox.root(), &glob_set, &mut paths).await?;
    paths.sort();

    let mut map = ProjectFileMap::new();
    for absolute in paths {
        let Ok(relative) = absolute.strip_prefix(sandbox.root()) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        let content = match tokio::fs::read_to_string(&absolute).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %relative, error = %e, "skipping unreadable file");
                continue;
            }
        };
        let file = build_project_file(&absolute, &relative, content, &signin);
        map.insert(relative, file);
    }

    tracing::info!(files = map.len(), root = %sandbox.root().display(), "project scan complete");
    Ok(map)
}

/// The file that owns routing and top-level composition, when present.
pub fn find_composition_root(map: &ProjectFileMap) -> Option<&ProjectFile> {
    for candidate in MAIN_FILE_CANDIDATES {
        if let Some(file) = map.get(*candidate) {
            return Some(file);
        }
    }
    map.values().find(|f| f.is_main_file)
}

fn source_glob_set() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in SOURCE_GLOBS {
        let glob = Glob::new(pattern)
            .map_err(|e| ReweaveError::Other(format!("bad source glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ReweaveError::Other(format!("glob set failed to build: {e}")))
}

fn build_project_file(
    absolute: &Path,
    relative: &str,
    content: String,
    signin: &Regex,
) -> ProjectFile {
    let name = absolute
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let component_name = absolute
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    ProjectFile {
        name,
        absolute_path: absolute.to_path_buf(),
        relative_path: relative.to_string(),
        line_count: content.lines().count(),
        size_bytes: content.len() as u64,
        snippet: snippet_of(&content),
        component_name,
        has_buttons: content.contains("<button") || content.contains("<Button"),
        has_signin: signin.is_match(&content),
        is_main_file: MAIN_FILE_CANDIDATES.contains(&relative),
        content,
    }
}

/// Recursive walk, skipping ignored directories. Matching is against the
/// file name only, so the globs stay flat.
async fn collect_source_files(
    root: &Path,
    current: &Path,
    globs: &GlobSet,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    let mut read_dir = tokio::fs::read_dir(current).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        let meta = entry.metadata().await?;
        if meta.is_dir() {
            let dir_name = entry.file_name().to_string_lossy().to_string();
            if IGNORED_DIRS.contains(&dir_name.as_str()) {
                continue;
            }
            Box::pin(collect_source_files(root, &path, globs, out)).await?;
        } else if let Some(name) = path.file_name() {
            if globs.is_match(Path::new(name)) {
                out.push(path);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;
    use tempfile::TempDir;

    async fn seed(dir: &TempDir, path: &str, content: &str) {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(full, content).await.unwrap();
    }

    fn sandbox(dir: &TempDir) -> PathSandbox {
        PathSandbox::new(dir.path(), SandboxConfig::default())
    }

    #[tokio::test]
    async fn scan_collects_source_files_with_relative_keys() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "src/App.jsx", "export default function App() {}").await;
        seed(&dir, "src/components/Header.jsx", "<header/>").await;
        seed(&dir, "README.md", "docs").await;

        let map = scan_project(&sandbox(&dir)).await.unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("src/App.jsx"));
        assert!(map.contains_key("src/components/Header.jsx"));
    }

    #[tokio::test]
    async fn scan_skips_ignored_directories() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "src/App.jsx", "app").await;
        seed(&dir, "node_modules/react/index.js", "module.exports = {}").await;
        seed(&dir, "dist/bundle.js", "minified").await;

        let map = scan_project(&sandbox(&dir)).await.unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("src/App.jsx"));
    }

    #[tokio::test]
    async fn scan_populates_derived_fields() {
        let dir = TempDir::new().unwrap();
        seed(
            &dir,
            "src/components/LoginForm.jsx",
            "<form>\n<button>Sign In</button>\n</form>",
        )
        .await;

        let map = scan_project(&sandbox(&dir)).await.unwrap();
        let file = &map["src/components/LoginForm.jsx"];
        assert_eq!(file.name, "LoginForm.jsx");
        assert_eq!(file.component_name, "LoginForm");
        assert_eq!(file.line_count, 3);
        assert!(file.has_buttons);
        assert!(file.has_signin);
        assert!(!file.is_main_file);
    }

    #[tokio::test]
    async fn signin_vocabulary_requires_word_boundaries() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "src/Design.jsx", "const design = 'designer';").await;
        seed(&dir, "src/Auth.jsx", "<a>Log in</a>").await;

        let map = scan_project(&sandbox(&dir)).await.unwrap();
        assert!(!map["src/Design.jsx"].has_signin);
        assert!(map["src/Auth.jsx"].has_signin);
    }

    #[tokio::test]
    async fn main_file_is_flagged_and_found() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "src/App.jsx", "<Routes/>").await;
        seed(&dir, "src/pages/Home.jsx", "<main/>").await;

        let map = scan_project(&sandbox(&dir)).await.unwrap();
        assert!(map["src/App.jsx"].is_main_file);

        let root = find_composition_root(&map).unwrap();
        assert_eq!(root.relative_path, "src/App.jsx");
    }

    #[tokio::test]
    async fn composition_root_absent_when_no_candidate() {
        let dir = TempDir::new().unwrap();
        seed(&dir, "src/pages/Home.jsx", "<main/>").await;
        let map = scan_project(&sandbox(&dir)).await.unwrap();
        assert!(find_composition_root(&map).is_none());
    }
}
