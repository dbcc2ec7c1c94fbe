//! Repository list loading.
//!
//! One URL per line. Blank lines and lines starting with `#` are ignored;
//! duplicates are dropped, keeping the first occurrence.

use crate::repo::LocalName;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

pub fn load_repository_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read repository list: {}", path.display()))?;
    Ok(parse_repository_list(&content))
}

pub fn parse_repository_list(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !seen.insert(line.to_string()) {
            warn!(line = lineno + 1, url = line, "duplicate repository URL ignored");
            continue;
        }
        urls.push(line.to_string());
    }

    urls
}

/// Keep only URLs whose local directory name starts with `prefix`.
///
/// URLs that do not yield a usable name are kept so that the run reports
/// them as invalid instead of silently dropping them.
pub fn filter_by_prefix(urls: Vec<String>, prefix: &str) -> Vec<String> {
    urls.into_iter()
        .filter(|url| match LocalName::from_url(url) {
            Ok(name) => name.as_str().starts_with(prefix),
            Err(_) => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_skips_blanks_comments_and_duplicates() {
        let urls = parse_repository_list(
            "# assignment 1\n\
             https://host/org/pa1-team1.git\n\
             \n\
             \t https://host/org/pa1-team2.git  \n\
             https://host/org/pa1-team1.git\n",
        );
        assert_eq!(
            urls,
            vec![
                "https://host/org/pa1-team1.git",
                "https://host/org/pa1-team2.git"
            ]
        );
    }

    #[test]
    fn test_parse_crlf() {
        let urls = parse_repository_list("a.git\r\nb.git\r\n");
        assert_eq!(urls, vec!["a.git", "b.git"]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_repository_list(&dir.path().join("repos.txt")).unwrap_err();
        assert!(err.to_string().contains("repos.txt"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repos.txt");
        std::fs::write(&path, "https://host/org/x.git\n").unwrap();
        assert_eq!(load_repository_list(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_filter_by_prefix() {
        let urls = vec![
            "https://host/org/pa1-team1.git".to_string(),
            "https://host/org/pa2-team1.git".to_string(),
            "git@host:org/pa1-team3.git".to_string(),
            "https://host/org/..".to_string(),
        ];
        let kept = filter_by_prefix(urls, "pa1");
        assert_eq!(
            kept,
            vec![
                "https://host/org/pa1-team1.git",
                "git@host:org/pa1-team3.git",
                "https://host/org/.."
            ]
        );
    }
}
