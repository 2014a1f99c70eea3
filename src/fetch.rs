//! Repository fetching into an ephemeral working tree.
//!
//! [`GitFetcher`] shells out to `git clone` the way a CI runner would;
//! the [`Workspace`] owns the destination directory and removes it on
//! drop, so every exit path of an indexing run — success or failure —
//! leaves no tree behind.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::error::Error;

/// Materializes a remote repository's default branch at a destination
/// path. Implementations must destroy any pre-existing destination
/// first so the caller always sees a clean tree.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, Error>;
}

/// Ephemeral clone destination, exclusively owned by one indexing run.
/// The backing temporary directory (and everything fetched into it) is
/// deleted when the workspace is dropped.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create() -> Result<Self, Error> {
        let dir = TempDir::new()
            .map_err(|e| Error::Fetch(format!("could not prepare workspace: {}", e)))?;
        Ok(Self { dir })
    }

    /// Destination path for the clone inside this workspace.
    pub fn clone_dest(&self) -> PathBuf {
        self.dir.path().join("repo")
    }
}

/// Fetcher backed by the `git` command-line tool.
pub struct GitFetcher;

#[async_trait]
impl Fetcher for GitFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf, Error> {
        if dest.exists() {
            std::fs::remove_dir_all(dest)
                .map_err(|e| Error::Fetch(format!("could not clear destination: {}", e)))?;
        }

        let url = url.to_string();
        let dest_buf = dest.to_path_buf();

        // git does blocking I/O; keep it off the async executor.
        let output = tokio::task::spawn_blocking(move || {
            Command::new("git")
                .args(["clone", "--depth", "1", "--single-branch"])
                .arg(&url)
                .arg(&dest_buf)
                .output()
        })
        .await
        .map_err(|e| Error::Fetch(format!("clone task failed: {}", e)))?
        .map_err(|e| Error::Fetch(format!("failed to execute 'git clone'. Is git installed? {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Fetch(format!("git clone failed: {}", stderr.trim())));
        }

        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_drop() {
        let path;
        {
            let workspace = Workspace::create().unwrap();
            path = workspace.clone_dest();
            std::fs::create_dir_all(&path).unwrap();
            std::fs::write(path.join("file.rs"), "fn f() {}").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_git_fetcher_clears_preexisting_destination() {
        let workspace = Workspace::create().unwrap();
        let dest = workspace.clone_dest();
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.txt"), "old").unwrap();

        // The clone itself fails (no such remote), but the stale tree
        // must already be gone by then.
        let result = GitFetcher
            .fetch("file:///nonexistent/definitely-missing", &dest)
            .await;
        assert!(result.is_err());
        assert!(!dest.join("stale.txt").exists());
    }
}
