//! Stage metadata and conflict classification.
//!
//! Git records up to three index stages for an unmerged path: stage 1 is the
//! common ancestor (base), stage 2 is "ours" and stage 3 is "theirs". Which
//! stages are present tells us whether both sides edited the file, one side
//! deleted it, or both sides created it independently.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// One side's version of a conflicted path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Common ancestor (index stage 1).
    Base,
    /// Current branch (index stage 2).
    Ours,
    /// Incoming side (index stage 3).
    Theirs,
}

impl Stage {
    /// The git index stage number.
    pub fn index_stage(self) -> i32 {
        match self {
            Self::Base => 1,
            Self::Ours => 2,
            Self::Theirs => 3,
        }
    }

    /// The `git checkout` flag selecting this stage, where one exists.
    pub fn checkout_flag(self) -> Option<&'static str> {
        match self {
            Self::Base => None,
            Self::Ours => Some("--ours"),
            Self::Theirs => Some("--theirs"),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// The set of index stages present for a path.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageSet {
    pub base: bool,
    pub ours: bool,
    pub theirs: bool,
}

impl StageSet {
    pub fn new(base: bool, ours: bool, theirs: bool) -> Self {
        Self { base, ours, theirs }
    }

    pub fn contains(&self, stage: Stage) -> bool {
        match stage {
            Stage::Base => self.base,
            Stage::Ours => self.ours,
            Stage::Theirs => self.theirs,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.base || self.ours || self.theirs)
    }

    /// Classify the conflict. Returns `None` for an empty set, which git
    /// never reports for an unmerged path.
    pub fn kind(&self) -> Option<ConflictKind> {
        match (self.base, self.ours, self.theirs) {
            (true, true, true) => Some(ConflictKind::BothModified),
            (false, true, true) => Some(ConflictKind::BothAdded),
            (true, true, false) => Some(ConflictKind::DeletedByThem),
            (true, false, true) => Some(ConflictKind::DeletedByUs),
            (false, true, false) => Some(ConflictKind::AddedByUs),
            (false, false, true) => Some(ConflictKind::AddedByThem),
            (true, false, false) => Some(ConflictKind::BothDeleted),
            (false, false, false) => None,
        }
    }
}

impl std::fmt::Display for StageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = [
            (self.base, "base"),
            (self.ours, "ours"),
            (self.theirs, "theirs"),
        ]
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, name)| *name)
        .collect();
        write!(f, "{}", names.join("+"))
    }
}

// ---------------------------------------------------------------------------
// Conflict kind
// ---------------------------------------------------------------------------

/// Categorisation of an unmerged path, as `git status` reports it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides modified the file (UU).
    BothModified,
    /// Both sides created the file independently (AA).
    BothAdded,
    /// We modified, they deleted (UD).
    DeletedByThem,
    /// We deleted, they modified (DU).
    DeletedByUs,
    /// Only our side has the file (AU), e.g. a rename on the other side.
    AddedByUs,
    /// Only their side has the file (UA).
    AddedByThem,
    /// Both sides deleted the file (DD).
    BothDeleted,
}

impl ConflictKind {
    /// `true` when both sides have content, so a merge tool can run.
    pub fn is_mergeable(self) -> bool {
        matches!(self, Self::BothModified | Self::BothAdded)
    }

    /// The two-letter code `git status --short` uses.
    pub fn short_code(self) -> &'static str {
        match self {
            Self::BothModified => "UU",
            Self::BothAdded => "AA",
            Self::DeletedByThem => "UD",
            Self::DeletedByUs => "DU",
            Self::AddedByUs => "AU",
            Self::AddedByThem => "UA",
            Self::BothDeleted => "DD",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BothModified => write!(f, "both modified"),
            Self::BothAdded => write!(f, "both added"),
            Self::DeletedByThem => write!(f, "deleted by them"),
            Self::DeletedByUs => write!(f, "deleted by us"),
            Self::AddedByUs => write!(f, "added by us"),
            Self::AddedByThem => write!(f, "added by them"),
            Self::BothDeleted => write!(f, "both deleted"),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge context
// ---------------------------------------------------------------------------

/// Which operation left the repository conflicted.
///
/// During a rebase git swaps the meaning of the sides: stage 2 is the
/// upstream being rebased onto and stage 3 is the commit being replayed, so
/// the engine offers "local"/"remote" instead of "ours"/"theirs".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergeContext {
    #[default]
    Merge,
    Rebase,
    CherryPick,
    Revert,
    /// Conflicts exist but no operation is recorded (e.g. `git stash pop`).
    Unknown,
}

impl MergeContext {
    /// The `git` subcommand that aborts this operation.
    pub fn abort_command(self) -> Option<&'static str> {
        match self {
            Self::Merge => Some("merge"),
            Self::Rebase => Some("rebase"),
            Self::CherryPick => Some("cherry-pick"),
            Self::Revert => Some("revert"),
            Self::Unknown => None,
        }
    }
}

impl From<git2::RepositoryState> for MergeContext {
    fn from(state: git2::RepositoryState) -> Self {
        use git2::RepositoryState as S;
        match state {
            S::Merge => Self::Merge,
            S::Rebase | S::RebaseInteractive | S::RebaseMerge => Self::Rebase,
            S::CherryPick | S::CherryPickSequence => Self::CherryPick,
            S::Revert | S::RevertSequence => Self::Revert,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for MergeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
            Self::CherryPick => write!(f, "cherry-pick"),
            Self::Revert => write!(f, "revert"),
            Self::Unknown => write!(f, "unknown operation"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        let cases = [
            (StageSet::new(true, true, true), ConflictKind::BothModified),
            (StageSet::new(false, true, true), ConflictKind::BothAdded),
            (StageSet::new(true, true, false), ConflictKind::DeletedByThem),
            (StageSet::new(true, false, true), ConflictKind::DeletedByUs),
            (StageSet::new(false, true, false), ConflictKind::AddedByUs),
            (StageSet::new(false, false, true), ConflictKind::AddedByThem),
            (StageSet::new(true, false, false), ConflictKind::BothDeleted),
        ];
        for (stages, expected) in cases {
            assert_eq!(stages.kind(), Some(expected), "stages {}", stages);
        }
        assert_eq!(StageSet::default().kind(), None);
    }

    #[test]
    fn test_only_two_sided_conflicts_are_mergeable() {
        assert!(ConflictKind::BothModified.is_mergeable());
        assert!(ConflictKind::BothAdded.is_mergeable());
        assert!(!ConflictKind::DeletedByUs.is_mergeable());
        assert!(!ConflictKind::BothDeleted.is_mergeable());
    }

    #[test]
    fn test_stage_set_display() {
        assert_eq!(StageSet::new(true, false, true).to_string(), "base+theirs");
        assert_eq!(StageSet::new(false, true, true).to_string(), "ours+theirs");
    }

    #[test]
    fn test_merge_context_from_repository_state() {
        assert_eq!(
            MergeContext::from(git2::RepositoryState::RebaseMerge),
            MergeContext::Rebase
        );
        assert_eq!(
            MergeContext::from(git2::RepositoryState::Merge),
            MergeContext::Merge
        );
        assert_eq!(
            MergeContext::from(git2::RepositoryState::Clean),
            MergeContext::Unknown
        );
        assert_eq!(MergeContext::Unknown.abort_command(), None);
    }
}
