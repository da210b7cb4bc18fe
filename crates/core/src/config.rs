//! TOML-based configuration for Conflux.
//!
//! The configuration carries general workflow switches, the list of external
//! diff/merge tools keyed by file suffix, and the conflict log settings. The
//! engine only reads it; editing happens in the file itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::tools::template;

/// File name looked up in the repository root when no path is given.
pub const REPO_CONFIG_FILE: &str = ".conflux.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Workflow and logging switches.
    #[serde(default)]
    pub general: GeneralConfig,

    /// External tools, matched in order.
    #[serde(default)]
    pub tools: Vec<ToolConfig>,

    /// Conflict log side channel.
    #[serde(default)]
    pub log: ConflictLogConfig,
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

/// General workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Restart from the first unresolved path after reaching the end.
    #[serde(default = "default_true")]
    pub wrap_around: bool,

    /// Treat a merged file that still contains conflict markers as
    /// unresolved even when the tool exits cleanly.
    #[serde(default = "default_true")]
    pub reject_conflict_markers: bool,
}

fn default_log_level() -> String {
    "warn".into()
}
fn default_true() -> bool {
    true
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            wrap_around: true,
            reject_conflict_markers: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// What a tool configuration may be used for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Diff,
    #[default]
    Merge,
    Both,
    /// Matches paths but never runs.
    Disabled,
}

impl ToolKind {
    pub fn can_merge(self) -> bool {
        matches!(self, Self::Merge | Self::Both)
    }

    pub fn can_diff(self) -> bool {
        matches!(self, Self::Diff | Self::Both)
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Diff => write!(f, "diff"),
            Self::Merge => write!(f, "merge"),
            Self::Both => write!(f, "both"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// One external diff/merge tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolConfig {
    /// Display name, recorded as `tool_used` on resolution.
    pub name: String,

    /// Extensions (`png`, `.png`) or glob patterns (`docs/**/*.md`) this
    /// tool applies to. `*` matches every path.
    pub suffixes: Vec<String>,

    #[serde(default)]
    pub kind: ToolKind,

    /// Command template with `$LOCAL`, `$REMOTE`, `$BASE` and `$MERGED`
    /// placeholders, split like a POSIX shell would.
    pub command: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Conflict log
// ---------------------------------------------------------------------------

/// Storage format of the conflict log.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Jsonl,
    /// A `resolutions` table in a SQLite database.
    Sqlite,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jsonl => write!(f, "jsonl"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Conflict log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictLogConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub format: LogFormat,

    /// Log location; relative paths are resolved against the repository's
    /// `.git` directory.
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("conflux-log.jsonl")
}

impl Default for ConflictLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            format: LogFormat::default(),
            path: default_log_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        debug!(tools = config.tools.len(), "configuration parsed successfully");
        Ok(config)
    }

    /// Load the first existing file among `candidates`, or the defaults when
    /// none exists.
    pub fn load_first_existing(candidates: &[PathBuf]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for candidate in candidates {
            if candidate.exists() {
                let config = Self::load_from_file(candidate)?;
                return Ok((config, Some(candidate.clone())));
            }
        }
        debug!("no configuration file found, using defaults");
        Ok((Self::default(), None))
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.general.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".into(),
                detail: format!(
                    "'{}' is not one of {}",
                    self.general.log_level,
                    LOG_LEVELS.join(", ")
                ),
            });
        }

        let mut names = HashSet::new();
        for (i, tool) in self.tools.iter().enumerate() {
            let field = |name: &str| format!("tools[{}].{}", i, name);
            if tool.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field("name"),
                    detail: "tool name must not be empty".into(),
                });
            }
            if !names.insert(tool.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: field("name"),
                    detail: format!("duplicate tool name '{}'", tool.name),
                });
            }
            if tool.suffixes.is_empty() || tool.suffixes.iter().any(|s| s.trim().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: field("suffixes"),
                    detail: "at least one non-empty suffix is required".into(),
                });
            }
            if tool.kind != ToolKind::Disabled {
                match shlex::split(&tool.command) {
                    Some(words) if !words.is_empty() => {}
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            field: field("command"),
                            detail: format!("cannot parse command '{}'", tool.command),
                        })
                    }
                }
            }
            if tool.kind.can_merge() && !template::writes_merged(&tool.command) {
                return Err(ConfigError::InvalidValue {
                    field: field("command"),
                    detail: "a merge tool must write its result to $MERGED".into(),
                });
            }
        }

        if self.log.enabled && self.log.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log.path".into(),
                detail: "log path must not be empty when the log is enabled".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// The default configuration file written by `conflux init`.
    pub fn default_toml() -> &'static str {
        r#"# Conflux configuration
# Tools are matched in order; the first enabled entry whose suffix matches
# the conflicted path wins. Placeholders: $LOCAL $REMOTE $BASE $MERGED

[general]
log_level = "warn"
wrap_around = true
reject_conflict_markers = true

[[tools]]
name = "meld"
suffixes = ["*"]
kind = "both"
command = "meld --auto-merge $LOCAL $BASE $REMOTE --output $MERGED"

# [[tools]]
# name = "kdiff3"
# suffixes = ["txt", "md"]
# kind = "merge"
# command = "kdiff3 $BASE $LOCAL $REMOTE -o $MERGED"

[log]
enabled = false
format = "jsonl"
path = "conflux-log.jsonl"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[general]
log_level = "debug"
wrap_around = false

[[tools]]
name = "imgmerge"
suffixes = ["png", ".jpg"]
kind = "merge"
command = "imgmerge --base '$BASE' $LOCAL $REMOTE -o $MERGED"

[[tools]]
name = "off"
suffixes = ["bin"]
kind = "disabled"
command = ""

[log]
enabled = true
format = "sqlite"
path = "/tmp/conflicts.db"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::from_toml(sample_toml()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert!(!config.general.wrap_around);
        assert!(config.general.reject_conflict_markers);
        assert_eq!(config.tools.len(), 2);
        assert_eq!(config.tools[0].kind, ToolKind::Merge);
        assert!(config.tools[0].enabled);
        assert_eq!(config.tools[1].kind, ToolKind::Disabled);
        assert_eq!(config.log.format, LogFormat::Sqlite);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(sample_toml().as_bytes()).unwrap();
        let config = AppConfig::load_and_validate(tmp.path()).unwrap();
        assert_eq!(config.tools[0].name, "imgmerge");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/conflux.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_first_existing_falls_back_to_defaults() {
        let (config, path) =
            AppConfig::load_first_existing(&[PathBuf::from("/nonexistent/a.toml")]).unwrap();
        assert!(path.is_none());
        assert!(config.tools.is_empty());
        assert_eq!(config.general.log_level, "warn");
    }

    #[test]
    fn test_validate_rejects_duplicate_tool_names() {
        let mut config = AppConfig::from_toml(sample_toml()).unwrap();
        config.tools[1].name = "imgmerge".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate tool name"));
    }

    #[test]
    fn test_validate_rejects_unbalanced_quotes() {
        let mut config = AppConfig::from_toml(sample_toml()).unwrap();
        config.tools[0].command = "merge 'unterminated $MERGED".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_requires_merged_for_merge_tools() {
        let mut config = AppConfig::from_toml(sample_toml()).unwrap();
        config.tools[0].command = "imgmerge $BASE $LOCAL $REMOTE".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("$MERGED"));

        config.tools[0].kind = ToolKind::Diff;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = AppConfig::default();
        config.general.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_toml_is_valid() {
        let config = AppConfig::from_toml(AppConfig::default_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.tools[0].kind, ToolKind::Both);
        assert!(!config.log.enabled);
    }

    #[test]
    fn test_parse_error() {
        let result = AppConfig::from_toml("[[tools]]\nname = 3");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
