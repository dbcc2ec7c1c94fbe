//! Repository references and the on-disk names derived from them.

use crate::errors::RepoRefError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A remote repository URL together with its validated local directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    url: String,
    local_name: LocalName,
}

impl RepositoryRef {
    /// Parse a repository URL, rejecting anything whose derived local name
    /// could escape the workspace root or be mistaken for a tool option.
    pub fn parse(url: &str) -> Result<Self, RepoRefError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(RepoRefError::Empty);
        }
        if url.starts_with('-') {
            return Err(RepoRefError::OptionLike {
                url: url.to_string(),
            });
        }

        let local_name = LocalName::from_url(url)?;
        Ok(Self {
            url: url.to_string(),
            local_name,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn local_name(&self) -> &LocalName {
        &self.local_name
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Filesystem-safe directory name derived from a repository URL.
///
/// Always a single, non-empty path segment: never `.`/`..`, never containing
/// a separator or NUL, never starting with `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalName(String);

impl LocalName {
    /// Derive the local name the same way the clone tool picks its target
    /// directory: last path segment (after `/` or, for scp-style remotes,
    /// `:`), with one `.git` suffix removed.
    pub fn from_url(url: &str) -> Result<Self, RepoRefError> {
        let trimmed = url.trim().trim_end_matches('/');
        let segment = trimmed
            .rsplit(['/', ':'])
            .next()
            .unwrap_or_default();
        let name = segment.strip_suffix(".git").unwrap_or(segment);

        Self::new(name).map_err(|_| RepoRefError::InvalidLocalName {
            url: url.to_string(),
            name: name.to_string(),
        })
    }

    /// Validate an already-derived name.
    pub fn new(name: &str) -> Result<Self, RepoRefError> {
        let invalid = || RepoRefError::InvalidLocalName {
            url: String::new(),
            name: name.to_string(),
        };

        if name.is_empty() || name == "." || name == ".." || name.starts_with('-') {
            return Err(invalid());
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(invalid());
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<std::path::Path> for LocalName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl TryFrom<String> for LocalName {
    type Error = RepoRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<LocalName> for String {
    fn from(value: LocalName) -> Self {
        value.0
    }
}
