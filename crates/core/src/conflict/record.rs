//! The per-path unit of merge-conflict state.

use serde::{Deserialize, Serialize};

use super::action::{ResolutionAction, ResolutionMethod};
use super::kind::{ConflictKind, MergeContext, StageSet};

/// Lifecycle status of a conflict record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    #[default]
    Unresolved,
    /// A tool or editor session is open for the path.
    InProgress,
    Resolved,
    /// Passed over by the user; continuous resolve does not visit it.
    Skipped,
}

impl std::fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unresolved => write!(f, "unresolved"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Resolved => write!(f, "resolved"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// A conflicted path tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictRecord {
    /// Repository-relative path, forward-slash separated.
    pub path: String,
    /// Index stages present for the path.
    pub stages: StageSet,
    /// Classification derived from `stages`.
    pub kind: ConflictKind,
    /// Current status.
    pub state: ResolutionState,
    /// Name of the external tool that resolved the path, if any.
    pub tool_used: Option<String>,
    /// How the path was resolved, if it was.
    pub method: Option<ResolutionMethod>,
    /// Description of the last failed attempt.
    pub last_error: Option<String>,
}

impl ConflictRecord {
    /// Create a fresh, unresolved record. Returns `None` for an empty stage
    /// set.
    pub fn new(path: impl Into<String>, stages: StageSet) -> Option<Self> {
        let kind = stages.kind()?;
        Some(Self {
            path: path.into(),
            stages,
            kind,
            state: ResolutionState::Unresolved,
            tool_used: None,
            method: None,
            last_error: None,
        })
    }

    /// Direct actions offered for this record.
    pub fn available_actions(&self, context: MergeContext) -> Vec<ResolutionAction> {
        ResolutionAction::available(self.kind, context)
    }

    /// File extension without the dot, lowercased.
    pub fn extension(&self) -> Option<String> {
        let file_name = self.path.rsplit('/').next().unwrap_or(&self.path);
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn is_unresolved(&self) -> bool {
        self.state == ResolutionState::Unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_unresolved() {
        let record = ConflictRecord::new("src/lib.rs", StageSet::new(true, true, true)).unwrap();
        assert_eq!(record.state, ResolutionState::Unresolved);
        assert_eq!(record.kind, ConflictKind::BothModified);
        assert!(record.tool_used.is_none());
        assert!(ConflictRecord::new("x", StageSet::default()).is_none());
    }

    #[test]
    fn test_extension() {
        let rec = |p: &str| ConflictRecord::new(p, StageSet::new(true, true, true)).unwrap();
        assert_eq!(rec("img/Logo.PNG").extension().as_deref(), Some("png"));
        assert_eq!(rec("a.tar.gz").extension().as_deref(), Some("gz"));
        assert_eq!(rec("Makefile").extension(), None);
        assert_eq!(rec("dir.d/.gitignore").extension(), None);
    }
}
