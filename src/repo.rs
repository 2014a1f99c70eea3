//! Canonical repository identity.
//!
//! Every indexed chunk, every status check, and every retrieval query is
//! scoped by a [`RepoId`] — the `owner/name` pair derived from a GitHub
//! repository URL. Derivation is deterministic and injective over
//! well-formed URLs; anything else is rejected before side effects occur.

use std::fmt;

use crate::error::Error;

/// `owner/name` identity of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    /// Parse a repository URL of the form `https://github.com/{owner}/{name}`.
    ///
    /// A trailing slash and a `.git` suffix are tolerated. Any other
    /// scheme, host, or path shape is rejected with [`Error::Input`].
    pub fn parse(url: &str) -> Result<Self, Error> {
        let rest = url
            .trim()
            .strip_prefix("https://github.com/")
            .ok_or_else(|| invalid(url))?;

        let rest = rest.trim_end_matches('/');
        let mut segments = rest.split('/');
        let owner = segments.next().unwrap_or_default();
        let name = segments.next().unwrap_or_default();

        if owner.is_empty() || name.is_empty() || segments.next().is_some() {
            return Err(invalid(url));
        }

        let name = name.strip_suffix(".git").unwrap_or(name);
        if name.is_empty() {
            return Err(invalid(url));
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// The canonical `owner/name` key used in the index store.
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Display path for a file inside this repository:
    /// `{owner}/{name}/{relative path}`.
    pub fn display_path(&self, relative: &str) -> String {
        format!("{}/{}/{}", self.owner, self.name, relative)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn invalid(url: &str) -> Error {
    Error::Input(format!(
        "invalid GitHub repo URL '{}': must be of the form https://github.com/owner/repo",
        url
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed() {
        let id = RepoId::parse("https://github.com/rust-lang/cargo").unwrap();
        assert_eq!(id.owner, "rust-lang");
        assert_eq!(id.name, "cargo");
        assert_eq!(id.key(), "rust-lang/cargo");
    }

    #[test]
    fn test_parse_tolerates_trailing_slash_and_git_suffix() {
        let a = RepoId::parse("https://github.com/rust-lang/cargo/").unwrap();
        let b = RepoId::parse("https://github.com/rust-lang/cargo.git").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let url = "https://github.com/tokio-rs/tokio";
        assert_eq!(RepoId::parse(url).unwrap(), RepoId::parse(url).unwrap());
    }

    #[test]
    fn test_rejects_wrong_scheme() {
        assert!(RepoId::parse("http://github.com/owner/repo").is_err());
        assert!(RepoId::parse("git@github.com:owner/repo.git").is_err());
    }

    #[test]
    fn test_rejects_wrong_host() {
        assert!(RepoId::parse("https://gitlab.com/owner/repo").is_err());
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        assert!(RepoId::parse("https://github.com/owner").is_err());
        assert!(RepoId::parse("https://github.com/owner/repo/tree/main").is_err());
        assert!(RepoId::parse("https://github.com/").is_err());
    }

    #[test]
    fn test_display_path() {
        let id = RepoId::parse("https://github.com/octo/app").unwrap();
        assert_eq!(id.display_path("src/main.rs"), "octo/app/src/main.rs");
    }
}
