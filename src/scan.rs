//! File classification over a repository working tree.
//!
//! Decides which files are worth indexing: extensions on a fixed
//! allow-list, minus anything under build-artifact or dependency
//! directories. Excluded directories are pruned from the walk entirely,
//! never traversed.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::models::SourceFile;

/// Extensions considered indexable source text.
const INDEXABLE_EXTENSIONS: [&str; 32] = [
    // Programming languages
    "py", "js", "ts", "jsx", "tsx", "java", "go", "rb", "rs", "cpp", "c", "cs", "kt", "swift",
    "php", // Web frontend
    "html", "htm", "css", "scss", "sass", "vue", "astro", // Config / infra
    "json", "yaml", "yml", "toml", "ini", "env", // Markdown / docs
    "md", "mdx", "txt", // Notebooks
    "ipynb",
];

/// Directory names whose subtrees are never scanned.
const EXCLUDED_DIRS: [&str; 26] = [
    // System and metadata
    ".git",
    ".github",
    ".vscode",
    ".idea",
    "__pycache__",
    // JS / Node ecosystem
    "node_modules",
    "dist",
    "build",
    ".next",
    ".turbo",
    "out",
    "coverage",
    // Python
    ".mypy_cache",
    ".pytest_cache",
    "venv",
    "env",
    "site-packages",
    // JVM / Gradle
    ".gradle",
    ".settings",
    // Rust / Java build output
    "target",
    // Go
    "bin",
    "pkg",
    // Misc
    ".cache",
    "logs",
    "snapshots",
    "checkpoints",
];

/// Walk a working tree and return the relative paths of all indexable
/// files, sorted for deterministic ordering on a fixed filesystem state.
pub fn scan_tree(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            // Prune excluded directories before descending into them.
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                !EXCLUDED_DIRS.contains(&name.as_ref())
            } else {
                true
            }
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy();
                    INDEXABLE_EXTENSIONS.contains(&ext.as_ref())
                })
                .unwrap_or(false)
        })
        .map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf()
        })
        .collect();

    files.sort();
    files
}

/// Read one classified file: best-effort decoded content plus its
/// language tag. Returns `None` (with a warning) when the file cannot
/// be read — a single unreadable file never aborts the pipeline.
pub fn read_source_file(root: &Path, relative: &Path) -> Option<SourceFile> {
    let bytes = match std::fs::read(root.join(relative)) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(file = %relative.display(), error = %e, "skipping unreadable file");
            return None;
        }
    };

    let language = relative
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_default();

    Some(SourceFile {
        relative_path: relative.to_string_lossy().replace('\\', "/"),
        language,
        content: String::from_utf8_lossy(&bytes).into_owned(),
    })
}
