//! Path filters narrowing the working set of conflicts.
//!
//! A [`PathFilter`] is either a glob (when the expression contains glob
//! metacharacters) or a plain case-insensitive substring.
//!
//! | Expression | Kind | Matches |
//! |------------|------|---------|
//! | `*.png` | glob | `logo.png`, `img/logo.png` |
//! | `src/**` | glob | everything under `src/` |
//! | `readme` | substring | `README.md`, `docs/readme.txt` |
//!
//! Globs without a `/` are also tried against the file name alone, so
//! `*.png` matches PNGs in every directory.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A predicate over repository-relative paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "pattern")]
pub enum PathFilter {
    Glob(String),
    Substring(String),
}

impl PathFilter {
    /// Parse a user-supplied filter expression.
    pub fn parse(expression: &str) -> Self {
        let expression = expression.trim().replace('\\', "/");
        if expression.contains(['*', '?', '[', '{']) {
            Self::Glob(expression)
        } else {
            Self::Substring(expression.to_lowercase())
        }
    }

    /// Test whether `rel_path` passes the filter.
    pub fn matches(&self, rel_path: &str) -> bool {
        let path = rel_path.replace('\\', "/");
        let matched = match self {
            Self::Glob(pattern) => {
                glob_match::glob_match(pattern, &path)
                    || (!pattern.contains('/')
                        && path
                            .rsplit('/')
                            .next()
                            .map(|name| glob_match::glob_match(pattern, name))
                            .unwrap_or(false))
            }
            Self::Substring(needle) => path.to_lowercase().contains(needle.as_str()),
        };
        debug!(path = rel_path, filter = %self, matched, "evaluated path filter");
        matched
    }
}

impl std::fmt::Display for PathFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Glob(p) => write!(f, "glob '{}'", p),
            Self::Substring(s) => write!(f, "contains '{}'", s),
        }
    }
}

impl From<&str> for PathFilter {
    fn from(expression: &str) -> Self {
        Self::parse(expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_picks_kind() {
        assert_eq!(PathFilter::parse("*.png"), PathFilter::Glob("*.png".into()));
        assert_eq!(
            PathFilter::parse(" ReadMe "),
            PathFilter::Substring("readme".into())
        );
    }

    #[test]
    fn test_extension_glob_matches_any_directory() {
        let f = PathFilter::parse("*.png");
        assert!(f.matches("logo.png"));
        assert!(f.matches("assets/img/logo.png"));
        assert!(!f.matches("logo.png.txt"));
    }

    #[test]
    fn test_directory_glob() {
        let f = PathFilter::parse("src/**");
        assert!(f.matches("src/main.rs"));
        assert!(f.matches("src/a/b/c.rs"));
        assert!(!f.matches("tests/src.rs"));
    }

    #[test]
    fn test_substring_is_case_insensitive() {
        let f = PathFilter::parse("readme");
        assert!(f.matches("docs/README.md"));
        assert!(!f.matches("docs/guide.md"));
    }

    #[test]
    fn test_backslashes_normalized() {
        let f = PathFilter::parse("src\\**");
        assert!(f.matches("src\\lib.rs"));
    }
}
