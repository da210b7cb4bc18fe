//! Direct resolution actions.
//!
//! Besides running a merge tool, a conflict can be resolved by picking one
//! side wholesale or by deleting the file. Which actions make sense depends
//! on the [`ConflictKind`] and, for two-sided edits, on whether the
//! repository is merging or rebasing.

use serde::{Deserialize, Serialize};

use super::kind::{ConflictKind, MergeContext, Stage};

/// A resolution that does not need an external tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    UseOurs,
    UseTheirs,
    /// Rebase wording for [`Stage::Ours`].
    UseLocal,
    /// Rebase wording for [`Stage::Theirs`].
    UseRemote,
    /// Keep the side that created the file.
    UseCreated,
    /// Keep the side that modified the file.
    UseModified,
    DeleteFile,
}

impl ResolutionAction {
    pub const ALL: [ResolutionAction; 7] = [
        Self::UseOurs,
        Self::UseTheirs,
        Self::UseLocal,
        Self::UseRemote,
        Self::UseCreated,
        Self::UseModified,
        Self::DeleteFile,
    ];

    /// The actions offered for a conflict of `kind` in `context`.
    pub fn available(kind: ConflictKind, context: MergeContext) -> Vec<ResolutionAction> {
        match kind {
            ConflictKind::BothModified if context == MergeContext::Rebase => {
                vec![Self::UseLocal, Self::UseRemote]
            }
            ConflictKind::BothModified => vec![Self::UseOurs, Self::UseTheirs],
            ConflictKind::BothAdded => vec![Self::UseCreated, Self::UseModified],
            ConflictKind::DeletedByThem | ConflictKind::DeletedByUs => {
                vec![Self::UseModified, Self::DeleteFile]
            }
            ConflictKind::AddedByUs | ConflictKind::AddedByThem => {
                vec![Self::UseCreated, Self::DeleteFile]
            }
            ConflictKind::BothDeleted => vec![Self::DeleteFile],
        }
    }

    /// The index stage whose content this action keeps, or `None` when the
    /// action deletes the path or does not apply to `kind`.
    pub fn target_stage(self, kind: ConflictKind) -> Option<Stage> {
        match (self, kind) {
            (Self::DeleteFile, _) => None,
            (Self::UseOurs | Self::UseLocal, ConflictKind::BothModified) => Some(Stage::Ours),
            (Self::UseTheirs | Self::UseRemote, ConflictKind::BothModified) => Some(Stage::Theirs),
            (Self::UseCreated, ConflictKind::BothAdded | ConflictKind::AddedByUs) => {
                Some(Stage::Ours)
            }
            (Self::UseCreated, ConflictKind::AddedByThem) => Some(Stage::Theirs),
            (Self::UseModified, ConflictKind::BothAdded | ConflictKind::DeletedByUs) => {
                Some(Stage::Theirs)
            }
            (Self::UseModified, ConflictKind::DeletedByThem) => Some(Stage::Ours),
            _ => None,
        }
    }

    /// Short name accepted on the command line.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::UseOurs => "ours",
            Self::UseTheirs => "theirs",
            Self::UseLocal => "local",
            Self::UseRemote => "remote",
            Self::UseCreated => "created",
            Self::UseModified => "modified",
            Self::DeleteFile => "delete",
        }
    }
}

impl std::str::FromStr for ResolutionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = wanted.strip_prefix("use-").unwrap_or(&wanted);
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.keyword() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|a| a.keyword()).collect();
                format!("unknown action '{}': expected one of {}", s, names.join(", "))
            })
    }
}

impl std::fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UseOurs => write!(f, "use ours"),
            Self::UseTheirs => write!(f, "use theirs"),
            Self::UseLocal => write!(f, "use local"),
            Self::UseRemote => write!(f, "use remote"),
            Self::UseCreated => write!(f, "use created"),
            Self::UseModified => write!(f, "use modified"),
            Self::DeleteFile => write!(f, "deleted file"),
        }
    }
}

/// How a conflict was resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum ResolutionMethod {
    /// An external merge tool produced the result.
    Tool(String),
    /// A direct action picked a side or deleted the file.
    Action(ResolutionAction),
}

impl ResolutionMethod {
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::Tool(name) => Some(name),
            Self::Action(_) => None,
        }
    }
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool(name) => write!(f, "tool {}", name),
            Self::Action(action) => write!(f, "{}", action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase_uses_local_remote_wording() {
        assert_eq!(
            ResolutionAction::available(ConflictKind::BothModified, MergeContext::Merge),
            vec![ResolutionAction::UseOurs, ResolutionAction::UseTheirs]
        );
        assert_eq!(
            ResolutionAction::available(ConflictKind::BothModified, MergeContext::Rebase),
            vec![ResolutionAction::UseLocal, ResolutionAction::UseRemote]
        );
    }

    #[test]
    fn test_created_and_deleted_conflicts_offer_their_own_actions() {
        let add_add = ResolutionAction::available(ConflictKind::BothAdded, MergeContext::Merge);
        assert!(add_add.contains(&ResolutionAction::UseCreated));
        assert!(!add_add.contains(&ResolutionAction::UseOurs));

        let modify_delete =
            ResolutionAction::available(ConflictKind::DeletedByUs, MergeContext::Merge);
        assert_eq!(
            modify_delete,
            vec![ResolutionAction::UseModified, ResolutionAction::DeleteFile]
        );
    }

    #[test]
    fn test_target_stage() {
        use ResolutionAction::*;
        assert_eq!(UseLocal.target_stage(ConflictKind::BothModified), Some(Stage::Ours));
        assert_eq!(UseModified.target_stage(ConflictKind::DeletedByUs), Some(Stage::Theirs));
        assert_eq!(UseModified.target_stage(ConflictKind::DeletedByThem), Some(Stage::Ours));
        assert_eq!(UseCreated.target_stage(ConflictKind::AddedByThem), Some(Stage::Theirs));
        assert_eq!(UseOurs.target_stage(ConflictKind::BothAdded), None);
        assert_eq!(DeleteFile.target_stage(ConflictKind::BothModified), None);
    }

    #[test]
    fn test_every_offered_action_is_applicable() {
        use ConflictKind::*;
        for kind in [
            BothModified,
            BothAdded,
            DeletedByThem,
            DeletedByUs,
            AddedByUs,
            AddedByThem,
            BothDeleted,
        ] {
            for ctx in [MergeContext::Merge, MergeContext::Rebase] {
                for action in ResolutionAction::available(kind, ctx) {
                    let applicable = action == ResolutionAction::DeleteFile
                        || action.target_stage(kind).is_some();
                    assert!(applicable, "{} offered for {} but has no target", action, kind);
                }
            }
        }
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!("theirs".parse::<ResolutionAction>(), Ok(ResolutionAction::UseTheirs));
        assert_eq!("use-created".parse::<ResolutionAction>(), Ok(ResolutionAction::UseCreated));
        assert!("mine".parse::<ResolutionAction>().is_err());
    }
}
