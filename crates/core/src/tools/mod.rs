//! External diff/merge tool selection and invocation.
//!
//! * [`ToolSet`] picks the configuration that applies to a path.
//! * [`template`] turns a command template into concrete arguments.
//! * [`runner`] launches processes behind the [`ProcessRunner`] trait.
//! * [`invoker`] ties them together and interprets the outcome.

pub mod invoker;
pub mod runner;
pub mod template;

use std::path::PathBuf;

use tempfile::TempDir;
use tracing::debug;

use crate::config::{ToolConfig, ToolKind};
use crate::errors::ToolError;
use crate::filter::PathFilter;

pub use invoker::{ExitOutcome, ToolInvoker, UnresolvedReason};
pub use runner::{ProcessRunner, RawExit, TokioProcessRunner};

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// What the tool is needed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Diff,
    Merge,
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Diff => write!(f, "diff"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// Result of looking up a tool for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolLookup<'a> {
    Found(&'a ToolConfig),
    /// Only disabled configurations match.
    Disabled(&'a ToolConfig),
    NotFound,
}

/// Read-only view over the configured tools.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    tools: Vec<ToolConfig>,
}

impl ToolSet {
    pub fn new(tools: Vec<ToolConfig>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[ToolConfig] {
        &self.tools
    }

    /// The first enabled, purpose-compatible tool whose suffix matches
    /// `rel_path`.
    pub fn lookup(&self, rel_path: &str, purpose: Purpose) -> ToolLookup<'_> {
        let mut disabled = None;
        for tool in &self.tools {
            if !suffix_matches(tool, rel_path) {
                continue;
            }
            if !tool.enabled || tool.kind == ToolKind::Disabled {
                disabled.get_or_insert(tool);
                continue;
            }
            let compatible = match purpose {
                Purpose::Merge => tool.kind.can_merge(),
                Purpose::Diff => tool.kind.can_diff(),
            };
            if compatible {
                debug!(path = rel_path, tool = %tool.name, %purpose, "tool matched");
                return ToolLookup::Found(tool);
            }
        }
        match disabled {
            Some(tool) => ToolLookup::Disabled(tool),
            None => ToolLookup::NotFound,
        }
    }

    /// Like [`lookup`](Self::lookup), but as a `Result`.
    pub fn require(&self, rel_path: &str, purpose: Purpose) -> Result<&ToolConfig, ToolError> {
        match self.lookup(rel_path, purpose) {
            ToolLookup::Found(tool) => Ok(tool),
            ToolLookup::Disabled(tool) => Err(ToolError::ToolDisabled {
                path: rel_path.to_string(),
                tool: tool.name.clone(),
            }),
            ToolLookup::NotFound => Err(ToolError::UnknownTool {
                path: rel_path.to_string(),
                purpose: purpose.to_string(),
            }),
        }
    }
}

fn suffix_matches(tool: &ToolConfig, rel_path: &str) -> bool {
    tool.suffixes.iter().any(|suffix| {
        let suffix = suffix.trim();
        if suffix == "*" {
            return true;
        }
        match PathFilter::parse(suffix) {
            PathFilter::Glob(_) => PathFilter::Glob(suffix.to_string()).matches(rel_path),
            PathFilter::Substring(_) if suffix.contains('/') => rel_path == suffix,
            PathFilter::Substring(_) => {
                let ext = suffix.trim_start_matches('.').to_ascii_lowercase();
                let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
                file_name.to_ascii_lowercase().ends_with(&format!(".{}", ext))
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Stage files
// ---------------------------------------------------------------------------

/// Concrete paths substituted for the template placeholders.
///
/// When the files were extracted into a temporary directory, the directory
/// is owned here and removed on drop.
#[derive(Debug)]
pub struct StageFiles {
    pub local: PathBuf,
    pub remote: PathBuf,
    pub base: PathBuf,
    pub merged: PathBuf,
    scratch: Option<TempDir>,
}

impl StageFiles {
    pub fn new(local: PathBuf, remote: PathBuf, base: PathBuf, merged: PathBuf) -> Self {
        Self {
            local,
            remote,
            base,
            merged,
            scratch: None,
        }
    }

    /// Keep `dir` alive for as long as these files are in use.
    pub fn with_scratch(mut self, dir: TempDir) -> Self {
        self.scratch = Some(dir);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str, suffixes: &[&str], kind: ToolKind, enabled: bool) -> ToolConfig {
        ToolConfig {
            name: name.into(),
            suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
            kind,
            command: format!("{} $MERGED", name),
            enabled,
        }
    }

    #[test]
    fn test_lookup_by_extension() {
        let set = ToolSet::new(vec![tool("img", &["png", ".JPG"], ToolKind::Merge, true)]);
        assert!(matches!(set.lookup("a/b.png", Purpose::Merge), ToolLookup::Found(t) if t.name == "img"));
        assert!(matches!(set.lookup("photo.jpg", Purpose::Merge), ToolLookup::Found(_)));
        assert_eq!(set.lookup("a.txt", Purpose::Merge), ToolLookup::NotFound);
        assert_eq!(set.lookup("png", Purpose::Merge), ToolLookup::NotFound);
    }

    #[test]
    fn test_first_enabled_match_wins() {
        let set = ToolSet::new(vec![
            tool("off", &["png"], ToolKind::Merge, false),
            tool("diffonly", &["png"], ToolKind::Diff, true),
            tool("img", &["png"], ToolKind::Both, true),
            tool("fallback", &["*"], ToolKind::Merge, true),
        ]);
        assert!(matches!(set.lookup("a.png", Purpose::Merge), ToolLookup::Found(t) if t.name == "img"));
        assert!(matches!(set.lookup("a.png", Purpose::Diff), ToolLookup::Found(t) if t.name == "diffonly"));
        assert!(matches!(set.lookup("a.txt", Purpose::Merge), ToolLookup::Found(t) if t.name == "fallback"));
    }

    #[test]
    fn test_disabled_match_is_distinct_from_no_match() {
        let set = ToolSet::new(vec![
            tool("off", &["bin"], ToolKind::Disabled, true),
            tool("img", &["png"], ToolKind::Merge, true),
        ]);
        assert!(matches!(set.lookup("x.bin", Purpose::Merge), ToolLookup::Disabled(t) if t.name == "off"));
        assert!(matches!(
            set.require("x.bin", Purpose::Merge),
            Err(ToolError::ToolDisabled { .. })
        ));
        assert!(matches!(
            set.require("x.txt", Purpose::Merge),
            Err(ToolError::UnknownTool { .. })
        ));
    }

    #[test]
    fn test_glob_suffixes() {
        let set = ToolSet::new(vec![tool("docs", &["docs/**/*.md"], ToolKind::Merge, true)]);
        assert!(matches!(set.lookup("docs/a/b.md", Purpose::Merge), ToolLookup::Found(_)));
        assert_eq!(set.lookup("src/b.md", Purpose::Merge), ToolLookup::NotFound);
    }
}
