//! Conflict records, stage classification, and resolution actions.
//!
//! The conflict subsystem defines the vocabulary the rest of the engine
//! speaks:
//! 1. **Kinds** -- which index stages exist for a path and what that means.
//! 2. **Actions** -- the direct resolutions offered for each kind.
//! 3. **Records** -- the per-path state the registry tracks.

pub mod action;
pub mod kind;
pub mod record;

pub use action::{ResolutionAction, ResolutionMethod};
pub use kind::{ConflictKind, MergeContext, Stage, StageSet};
pub use record::{ConflictRecord, ResolutionState};
